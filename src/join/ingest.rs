//! CSV Ingestor (spec §4.2): parses and validates an uploaded CSV stream
//! against the collection's schema and user-supplied options, producing a
//! normalized `JoinTable`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use csv::ReaderBuilder;
use uuid::Uuid;

use super::error::{JoinError, JoinResult};
use super::model::JoinTable;
use super::provider::FeatureProvider;

/// An uploaded file, as handed to the ingestor by the (out-of-scope) HTTP
/// multipart layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub buffer: Vec<u8>,
}

/// Recognized `ProcessCSV` options (spec §4.2 table).
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub collection_key: String,
    pub join_key: String,
    pub join_file: UploadedFile,
    /// Comma-separated whitelist; empty means "all non-conflicting columns".
    pub join_fields: String,
    pub csv_delimiter: char,
    pub csv_header_row: usize,
    pub csv_data_start_row: usize,
}

impl CsvOptions {
    fn validate_shape(&self) -> JoinResult<()> {
        if self.collection_key.trim().is_empty() {
            return Err(JoinError::MissingOption("collectionKey".to_string()));
        }
        if self.join_key.trim().is_empty() {
            return Err(JoinError::MissingOption("joinKey".to_string()));
        }
        if self.join_file.buffer.is_empty() && self.join_file.name.is_empty() {
            return Err(JoinError::MissingOption("joinFile".to_string()));
        }
        let ct = self.join_file.content_type.to_ascii_lowercase();
        if ct != "text/csv" && ct != "application/csv" {
            return Err(JoinError::ContentType(self.join_file.content_type.clone()));
        }
        if self.csv_header_row < 1 {
            return Err(JoinError::InvalidOption(
                "csvHeaderRow must be >= 1".to_string(),
            ));
        }
        if self.csv_data_start_row <= self.csv_header_row {
            return Err(JoinError::InvalidOption(
                "csvDataStartRow must be > csvHeaderRow".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses and validates an uploaded CSV against `provider`'s declared
/// schema, producing a fresh, immutable `JoinTable` (spec §4.2 algorithm).
pub fn process_csv(
    collection_id: &str,
    provider: &dyn FeatureProvider,
    options: &CsvOptions,
) -> JoinResult<JoinTable> {
    if provider.kind() != "feature" {
        return Err(JoinError::ProviderKind(provider.kind().to_string()));
    }

    options.validate_shape()?;

    if !provider.key_fields().contains_key(&options.collection_key) {
        return Err(JoinError::CollectionKeyNotInProvider(
            options.collection_key.clone(),
        ));
    }

    let text = String::from_utf8_lossy(&options.join_file.buffer).into_owned();
    let total_lines = text.lines().count();

    if options.csv_header_row > total_lines || options.csv_data_start_row > total_lines {
        return Err(JoinError::CsvShape(format!(
            "header row {} / data start row {} exceed file length {total_lines}",
            options.csv_header_row, options.csv_data_start_row
        )));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(options.csv_delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();

    let header_record = nth_record(&mut records, options.csv_header_row - 1)?
        .ok_or_else(|| JoinError::CsvShape("header row not found".to_string()))?;
    let header_fields: Vec<String> = header_record.iter().map(|s| s.to_string()).collect();

    if !header_fields.iter().any(|f| f == &options.join_key) {
        return Err(JoinError::UnknownJoinKey(options.join_key.clone()));
    }

    let collection_fields = provider.fields();
    let join_fields = effective_join_fields(
        &header_fields,
        &options.join_fields,
        collection_fields,
        &options.join_key,
    );

    let header_index: BTreeMap<&str, usize> = header_fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.as_str(), i))
        .collect();
    let join_key_idx = header_index[options.join_key.as_str()];
    let join_field_idx: Vec<usize> = join_fields
        .iter()
        .map(|f| header_index[f.as_str()])
        .collect();

    // Skip rows between the header and csvDataStartRow.
    let rows_to_skip = options
        .csv_data_start_row
        .saturating_sub(options.csv_header_row)
        .saturating_sub(1);
    for _ in 0..rows_to_skip {
        if records.next().is_none() {
            break;
        }
    }

    let mut data: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for record in records {
        let record = record.map_err(|e| JoinError::CsvShape(e.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let raw_key = record.get(join_key_idx).unwrap_or("");
        let key = raw_key.trim().to_string();
        if key.is_empty() {
            return Err(JoinError::EmptyKey(data.len()));
        }
        if data.contains_key(&key) {
            return Err(JoinError::DuplicateKey(key));
        }

        let row: Vec<String> = join_field_idx
            .iter()
            .map(|&i| record.get(i).unwrap_or("").to_string())
            .collect();

        data.insert(key, row);
    }

    Ok(JoinTable {
        id: Uuid::new_v4(),
        time_stamp: Utc::now(),
        collection_id: collection_id.to_string(),
        collection_key: options.collection_key.clone(),
        join_source: options.join_file.name.clone(),
        join_key: options.join_key.clone(),
        number_of_rows: data.len(),
        join_fields,
        data,
    })
}

fn nth_record(
    records: &mut csv::StringRecordsIter<'_, &[u8]>,
    n: usize,
) -> JoinResult<Option<csv::StringRecord>> {
    for _ in 0..n {
        if records.next().is_none() {
            return Ok(None);
        }
    }
    match records.next() {
        Some(Ok(record)) => Ok(Some(record)),
        Some(Err(e)) => Err(JoinError::CsvShape(e.to_string())),
        None => Ok(None),
    }
}

/// Computes the effective `joinFields` sequence (spec §4.2 step 7).
fn effective_join_fields(
    header_fields: &[String],
    user_join_fields: &str,
    collection_fields: &BTreeSet<String>,
    join_key: &str,
) -> Vec<String> {
    let user: Vec<String> = user_join_fields
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if !user.is_empty() {
        user.into_iter()
            .filter(|f| {
                header_fields.contains(f) && !collection_fields.contains(f) && f != join_key
            })
            .collect()
    } else {
        header_fields
            .iter()
            .filter(|f| !collection_fields.contains(*f) && f.as_str() != join_key)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::provider::InMemoryProvider;

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new(
            "feature",
            vec![("id", true)],
            vec!["id", "geometry", "name"],
        )
    }

    fn csv_file(name: &str, contents: &str) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            content_type: "text/csv".to_string(),
            buffer: contents.as_bytes().to_vec(),
        }
    }

    fn base_options(contents: &str) -> CsvOptions {
        CsvOptions {
            collection_key: "id".to_string(),
            join_key: "id".to_string(),
            join_file: csv_file("upload.csv", contents),
            join_fields: String::new(),
            csv_delimiter: ',',
            csv_header_row: 1,
            csv_data_start_row: 2,
        }
    }

    #[test]
    fn happy_path_ingests_all_non_conflicting_columns() {
        let provider = provider();
        let opts = base_options(
            "id,city,population,area\n1,A,100,50.5\n2,B,200,75.3\n3,C,150,60.2\n",
        );

        let table = process_csv("buildings", &provider, &opts).unwrap();

        assert_eq!(table.join_fields, vec!["city", "population", "area"]);
        assert_eq!(table.number_of_rows, 3);
        assert_eq!(
            table.data.get("2").unwrap(),
            &vec!["B".to_string(), "200".to_string(), "75.3".to_string()]
        );
    }

    #[test]
    fn duplicate_right_side_key_rejects() {
        let provider = provider();
        let opts = base_options("id,city\n1,A\n1,B\n");

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::DuplicateKey(_)));
    }

    #[test]
    fn empty_right_side_key_rejects() {
        let provider = provider();
        let opts = base_options("id,city\n,A\n2,B\n");

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::EmptyKey(_)));
    }

    #[test]
    fn offset_header_ingests_from_configured_rows() {
        let provider = provider();
        let mut opts =
            base_options("# comment one\n# comment two\nid,city\n1,A\n2,B\n");
        opts.csv_header_row = 3;
        opts.csv_data_start_row = 4;

        let table = process_csv("buildings", &provider, &opts).unwrap();
        assert_eq!(table.number_of_rows, 2);
    }

    #[test]
    fn default_header_rows_on_commented_file_yields_unknown_join_key() {
        let provider = provider();
        let opts = base_options("# comment one\n# comment two\nid,city\n1,A\n2,B\n");

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::UnknownJoinKey(_)));
    }

    #[test]
    fn column_collision_is_elided() {
        let provider = provider();
        let opts = base_options("id,name,population,area\n1,A,100,50.5\n");

        let table = process_csv("buildings", &provider, &opts).unwrap();
        assert_eq!(table.join_fields, vec!["population", "area"]);
    }

    #[test]
    fn explicit_join_fields_whitelist_is_honored_in_order() {
        let provider = provider();
        let mut opts = base_options("id,city,population,area\n1,A,100,50.5\n");
        opts.join_fields = "area,city".to_string();

        let table = process_csv("buildings", &provider, &opts).unwrap();
        assert_eq!(table.join_fields, vec!["area", "city"]);
    }

    #[test]
    fn unknown_join_key_rejects() {
        let provider = provider();
        let opts = CsvOptions {
            join_key: "does_not_exist".to_string(),
            ..base_options("id,city\n1,A\n")
        };

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::UnknownJoinKey(_)));
    }

    #[test]
    fn collection_key_must_be_declared_key_field() {
        let provider = provider();
        let opts = CsvOptions {
            collection_key: "name".to_string(),
            ..base_options("id,city\n1,A\n")
        };

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::CollectionKeyNotInProvider(_)));
    }

    #[test]
    fn non_feature_provider_is_rejected() {
        let provider = InMemoryProvider::new("coverage", vec![("id", true)], vec!["id"]);
        let opts = base_options("id,city\n1,A\n");

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::ProviderKind(_)));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let provider = provider();
        let opts = base_options("id,city\n1,A\n,\n2,B\n");

        let table = process_csv("buildings", &provider, &opts).unwrap();
        assert_eq!(table.number_of_rows, 2);
    }

    #[test]
    fn quoted_fields_with_embedded_delimiters_are_parsed_correctly() {
        let provider = provider();
        let opts = base_options("id,city\n1,\"Springfield, USA\"\n");

        let table = process_csv("buildings", &provider, &opts).unwrap();
        assert_eq!(table.data.get("1").unwrap(), &vec!["Springfield, USA".to_string()]);
    }

    #[test]
    fn non_csv_content_type_is_rejected() {
        let provider = provider();
        let mut opts = base_options("id,city\n1,A\n");
        opts.join_file.content_type = "application/json".to_string();

        let err = process_csv("buildings", &provider, &opts).unwrap_err();
        assert!(matches!(err, JoinError::ContentType(_)));
    }
}

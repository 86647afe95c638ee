//! Manager Facade (spec §4.5): the single entry point the rest of the
//! application talks to. Wraps the disabled/absent state so callers never
//! need to special-case "joins turned off".

use serde_json::Value;
use uuid::Uuid;

use super::enrich::perform_join as enrich_value;
use super::error::{JoinError, JoinResult};
use super::ingest::{self, CsvOptions};
use super::lock::clear_stale_locks;
use super::model::{JoinTable, LocateResult, ManagerConfig, SourceRef};
use super::provider::FeatureProvider;
use super::retention::{self, SweepReport};
use super::store::SourceStore;

/// State machine described by spec §4.5: `absent -> ProcessCSV -> present`,
/// `present -> Remove/retention -> absent`. Realized as an enum rather than
/// an `Option<SourceStore>` so call sites read as intent, not null-checks.
pub enum Manager {
    Enabled(ManagerInner),
    Disabled,
}

pub struct ManagerInner {
    store: SourceStore,
    max_days: u32,
    max_files: u32,
}

impl Manager {
    /// `FromConfig` (spec §9): returns the disabled sentinel when `config`
    /// is `None` — absence of the `joins` configuration key is not an
    /// error. Clears stale sibling lock files left by a prior crashed
    /// process before first use.
    pub fn from_config(config: Option<ManagerConfig>) -> JoinResult<Self> {
        let Some(config) = config else {
            return Ok(Manager::Disabled);
        };

        clear_stale_locks(&config.source_dir)?;
        let store = SourceStore::open(&config.source_dir)?;
        store.rebuild_index()?;

        let inner = ManagerInner {
            store,
            max_days: config.max_days,
            max_files: config.max_files,
        };
        retention::sweep(&inner.store, inner.max_days, inner.max_files)?;

        Ok(Manager::Enabled(inner))
    }

    fn inner(&self) -> JoinResult<&ManagerInner> {
        match self {
            Manager::Enabled(inner) => Ok(inner),
            Manager::Disabled => Err(JoinError::MissingOption(
                "joins feature is not configured".to_string(),
            )),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Manager::Enabled(_))
    }

    /// `ProcessCSV` (spec §4.5): ingest + persist, transitioning the
    /// collection's source into the `present` state.
    pub fn process_csv(
        &self,
        collection_id: &str,
        provider: &dyn FeatureProvider,
        options: &CsvOptions,
    ) -> JoinResult<JoinTable> {
        let inner = self.inner()?;
        let table = ingest::process_csv(collection_id, provider, options)?;
        inner.store.put(&table)?;
        retention::sweep(&inner.store, inner.max_days, inner.max_files)?;
        Ok(table)
    }

    /// `List`: every join source currently tracked for `collection_id`,
    /// filtered to those whose backing file still exists. An index entry
    /// whose file vanished out-of-band is reaped on the spot (spec §4.5
    /// "any observation of an orphan may reap it").
    pub fn list(&self, collection_id: &str) -> JoinResult<Vec<SourceRef>> {
        let inner = self.inner()?;
        let refs = inner.store.refs_for_collection(collection_id)?;

        let mut live = Vec::with_capacity(refs.len());
        for source_ref in refs {
            if source_ref.ref_path.is_file() {
                live.push(source_ref);
            } else {
                inner.store.locate(collection_id, &source_ref.id)?;
            }
        }
        Ok(live)
    }

    /// `Read`: the full `JoinTable` for `(collectionId, id)`.
    ///
    /// An index entry surviving its backing file (an orphan observed
    /// outside the retention sweep) is reaped on the spot and reported as
    /// `MissingFile`, per spec §4.5 "any observation of an orphan may reap
    /// it" and §4.4 step 1.
    pub fn read(&self, collection_id: &str, id: &str) -> JoinResult<JoinTable> {
        let inner = self.inner()?;
        let uuid = parse_id(id)?;

        match inner.store.locate(collection_id, &uuid)? {
            LocateResult::Found(path) => inner.store.read(&path),
            LocateResult::NotFound => Err(JoinError::NotFound(format!("{collection_id}/{id}"))),
            LocateResult::Missing => Err(JoinError::MissingFile(format!("{collection_id}/{id}"))),
        }
    }

    /// `Remove`: `false` when not found; `true` on delete and when the
    /// entry was an orphan (file already gone, reaped in the process).
    pub fn remove(&self, collection_id: &str, id: &str) -> JoinResult<bool> {
        let inner = self.inner()?;
        let uuid = parse_id(id)?;

        match inner.store.locate(collection_id, &uuid)? {
            LocateResult::Found(path) => inner.store.delete(&path, collection_id, &uuid, false),
            LocateResult::Missing => Ok(true),
            LocateResult::NotFound => Ok(false),
        }
    }

    /// Enriches `feature_value` in place against `(collectionId, id)`'s join
    /// table, returning the number of features actually joined.
    pub fn perform_join(
        &self,
        collection_id: &str,
        id: &str,
        feature_value: &mut Value,
    ) -> JoinResult<usize> {
        let table = self.read(collection_id, id)?;
        Ok(enrich_value(feature_value, &table))
    }

    /// Runs one retention sweep (spec §4.3). A no-op returning an empty
    /// report when joins are disabled.
    pub fn sweep(&self) -> JoinResult<SweepReport> {
        match self {
            Manager::Enabled(inner) => retention::sweep(&inner.store, inner.max_days, inner.max_files),
            Manager::Disabled => Ok(SweepReport::default()),
        }
    }
}

fn parse_id(id: &str) -> JoinResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| JoinError::InvalidId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::provider::InMemoryProvider;
    use crate::join::ingest::UploadedFile;

    fn config(dir: &std::path::Path) -> ManagerConfig {
        ManagerConfig {
            source_dir: dir.to_path_buf(),
            max_days: 0,
            max_files: 0,
        }
    }

    fn csv_options() -> CsvOptions {
        CsvOptions {
            collection_key: "id".to_string(),
            join_key: "id".to_string(),
            join_file: UploadedFile {
                name: "upload.csv".to_string(),
                content_type: "text/csv".to_string(),
                buffer: b"id,city\n1,Springfield\n2,Shelbyville\n".to_vec(),
            },
            join_fields: String::new(),
            csv_delimiter: ',',
            csv_header_row: 1,
            csv_data_start_row: 2,
        }
    }

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new("feature", vec![("id", true)], vec!["id", "name"])
    }

    #[test]
    fn disabled_manager_rejects_operations() {
        let manager = Manager::from_config(None).unwrap();
        assert!(!manager.is_enabled());
        let err = manager.read("buildings", &Uuid::new_v4().to_string());
        assert!(matches!(err, Err(JoinError::MissingOption(_))));
    }

    #[test]
    fn full_lifecycle_process_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::from_config(Some(config(dir.path()))).unwrap();
        let provider = provider();

        let table = manager
            .process_csv("buildings", &provider, &csv_options())
            .unwrap();

        let listed = manager.list("buildings").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, table.id);

        let read_back = manager.read("buildings", &table.id.to_string()).unwrap();
        assert_eq!(read_back.number_of_rows, 2);

        let mut feature = serde_json::json!({"type": "Feature", "properties": {"id": 1}});
        let joined = manager
            .perform_join("buildings", &table.id.to_string(), &mut feature)
            .unwrap();
        assert_eq!(joined, 1);
        assert_eq!(feature["properties"]["city"], serde_json::json!("Springfield"));

        let removed = manager.remove("buildings", &table.id.to_string()).unwrap();
        assert!(removed);
        assert!(manager.list("buildings").unwrap().is_empty());
    }

    #[test]
    fn remove_unknown_id_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::from_config(Some(config(dir.path()))).unwrap();
        let removed = manager.remove("buildings", &Uuid::new_v4().to_string()).unwrap();
        assert!(!removed);
    }

    #[test]
    fn read_with_non_uuid_id_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::from_config(Some(config(dir.path()))).unwrap();
        let err = manager.read("buildings", "not-a-uuid");
        assert!(matches!(err, Err(JoinError::InvalidId(_))));
    }
}

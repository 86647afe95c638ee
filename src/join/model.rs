//! Data model for the join manager (spec §3).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A materialized join source: the right-hand side of a left-join, keyed
/// for O(1) lookup. Immutable once created (spec §3 "Lifecycles").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinTable {
    pub id: Uuid,
    #[serde(rename = "timeStamp", with = "ts_format")]
    pub time_stamp: DateTime<Utc>,
    #[serde(rename = "collectionId")]
    pub collection_id: String,
    #[serde(rename = "collectionKey")]
    pub collection_key: String,
    #[serde(rename = "joinSource")]
    pub join_source: String,
    #[serde(rename = "joinKey")]
    pub join_key: String,
    #[serde(rename = "joinFields")]
    pub join_fields: Vec<String>,
    #[serde(rename = "numberOfRows")]
    pub number_of_rows: usize,
    /// `key -> ordered cell values`, positionally aligned with `join_fields`.
    pub data: BTreeMap<String, Vec<String>>,
}

impl JoinTable {
    /// The canonical on-disk file name for this source (spec §3 invariant 2).
    pub fn file_name(&self) -> String {
        format!("table-{}.json", self.id)
    }
}

/// Lightweight index record: the fast lookup path. The JSON file remains
/// the source of truth (spec §3 "SourceRef").
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub id: Uuid,
    pub collection_id: String,
    pub time_stamp: DateTime<Utc>,
    pub join_source: String,
    pub ref_path: PathBuf,
}

/// Outcome of a `Locate` lookup (spec §9: tagged variants replace a mix of
/// exception types).
#[derive(Debug, Clone)]
pub enum LocateResult {
    Found(PathBuf),
    NotFound,
    /// The index entry exists but its backing file does not.
    Missing,
}

/// Manager-level configuration: `{sourceDir, maxDays>=0, maxFiles>=0}`,
/// where `0` means "no cap" for the respective dimension (spec §3).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub source_dir: PathBuf,
    pub max_days: u32,
    pub max_files: u32,
}

/// Serializes/deserializes `DateTime<Utc>` as
/// `YYYY-MM-DDTHH:MM:SS.ffffffZ`, matching the persisted file format of
/// spec §6 exactly.
mod ts_format {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(&s, FORMAT)
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
            .map_err(serde::de::Error::custom)
    }
}

//! Source Store (spec §4.1): owns the on-disk layout — one JSON file per
//! join source, a side index, and per-file / per-index advisory locks.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::error::{JoinError, JoinResult};
use super::lock::{sibling_lock_path, FileLock, DEFAULT_LOCK_TIMEOUT};
use super::model::{JoinTable, LocateResult, SourceRef};

static TABLE_FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^table-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\.json$")
        .expect("static regex is valid")
});

/// Owns `sourceDir` and its side index (spec §4.1).
pub struct SourceStore {
    source_dir: PathBuf,
    index_lock_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SourceStore {
    /// Opens (creating if necessary) the store rooted at `source_dir`.
    pub fn open(source_dir: &Path) -> JoinResult<Self> {
        std::fs::create_dir_all(source_dir)?;

        let index_path = source_dir.join("index.db3");
        let conn = Connection::open(&index_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS source_refs (
                collection_id TEXT NOT NULL,
                id            TEXT NOT NULL,
                time_stamp    TEXT NOT NULL,
                join_source   TEXT NOT NULL,
                ref_path      TEXT NOT NULL,
                PRIMARY KEY (collection_id, id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_source_refs_id ON source_refs(id)",
            [],
        )?;

        Ok(Self {
            index_lock_path: source_dir.join("index.db3.lock"),
            source_dir: source_dir.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    fn data_path(&self, id: &Uuid) -> PathBuf {
        self.source_dir.join(format!("table-{id}.json"))
    }

    /// Writes `table` to `sourceDir/table-<id>.json` and upserts the index
    /// entry. File lock is acquired first, then released, before the index
    /// lock is taken (spec §4.1 lock order: file lock first, index lock
    /// second).
    pub fn put(&self, table: &JoinTable) -> JoinResult<PathBuf> {
        let data_path = self.data_path(&table.id);
        let lock_path = sibling_lock_path(&data_path);

        {
            let _file_lock = FileLock::acquire_exclusive(&lock_path, DEFAULT_LOCK_TIMEOUT)?;
            let file = File::create(&data_path)?;
            serde_json::to_writer_pretty(BufWriter::new(file), table)?;
        }

        self.upsert_index(table, &data_path)?;

        Ok(data_path)
    }

    /// Consults the index for `(collectionId, id)`.
    pub fn locate(&self, collection_id: &str, id: &Uuid) -> JoinResult<LocateResult> {
        let row = self.select_ref(collection_id, id)?;
        let Some(source_ref) = row else {
            return Ok(LocateResult::NotFound);
        };

        if source_ref.ref_path.is_file() {
            Ok(LocateResult::Found(source_ref.ref_path))
        } else {
            // Orphan: index entry survives the file. Reap before returning.
            self.remove_index_entry(collection_id, id)?;
            Ok(LocateResult::Missing)
        }
    }

    /// Decodes the `JoinTable` at `path`, under its per-file lock.
    pub fn read(&self, path: &Path) -> JoinResult<JoinTable> {
        let lock_path = sibling_lock_path(path);
        let _file_lock = FileLock::acquire_shared(&lock_path, DEFAULT_LOCK_TIMEOUT)?;
        let file = File::open(path)?;
        let table: JoinTable = serde_json::from_reader(BufReader::new(file))?;
        Ok(table)
    }

    /// Deletes the file at `path` and its index entry.
    ///
    /// In `silent` mode (used by the retention sweep), I/O failures are
    /// logged and `Ok(false)` is returned with the index entry retained so
    /// the sweep retries on its next pass. Otherwise I/O failures surface.
    pub fn delete(&self, path: &Path, collection_id: &str, id: &Uuid, silent: bool) -> JoinResult<bool> {
        let lock_path = sibling_lock_path(path);
        let unlink_result = {
            let _file_lock = FileLock::acquire_exclusive(&lock_path, DEFAULT_LOCK_TIMEOUT)?;
            match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        };
        let _ = std::fs::remove_file(&lock_path);

        match unlink_result {
            Ok(()) => {
                self.remove_index_entry(collection_id, id)?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("failed to delete {}: {}", path.display(), e);
                if silent {
                    Ok(false)
                } else {
                    Err(JoinError::Io(e.to_string()))
                }
            }
        }
    }

    /// Scans `sourceDir` for files matching the canonical pattern and
    /// upserts each into the index, skipping (and logging) any that fail
    /// to decode.
    pub fn rebuild_index(&self) -> JoinResult<()> {
        if !self.source_dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.source_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !TABLE_FILE_PATTERN.is_match(file_name) {
                continue;
            }

            match self.read(&path) {
                Ok(table) => {
                    if let Err(e) = self.upsert_index(&table, &path) {
                        tracing::warn!("failed to index {}: {}", path.display(), e);
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to decode {} during rebuild: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }

    /// All index entries across every collection, used by the retention
    /// sweep (which groups them by `collectionId` itself).
    pub fn all_refs(&self) -> JoinResult<Vec<SourceRef>> {
        let _index_lock = FileLock::acquire_shared(&self.index_lock_path, DEFAULT_LOCK_TIMEOUT)?;
        let conn = self.conn.lock().expect("index mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT collection_id, id, time_stamp, join_source, ref_path FROM source_refs",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_source_ref)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Index entries for a single collection, ordered by file name.
    pub fn refs_for_collection(&self, collection_id: &str) -> JoinResult<Vec<SourceRef>> {
        let _index_lock = FileLock::acquire_shared(&self.index_lock_path, DEFAULT_LOCK_TIMEOUT)?;
        let conn = self.conn.lock().expect("index mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT collection_id, id, time_stamp, join_source, ref_path FROM source_refs
             WHERE collection_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![collection_id], Self::row_to_source_ref)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn select_ref(&self, collection_id: &str, id: &Uuid) -> JoinResult<Option<SourceRef>> {
        let _index_lock = FileLock::acquire_shared(&self.index_lock_path, DEFAULT_LOCK_TIMEOUT)?;
        let conn = self.conn.lock().expect("index mutex poisoned");
        let result = conn
            .query_row(
                "SELECT collection_id, id, time_stamp, join_source, ref_path FROM source_refs
                 WHERE collection_id = ?1 AND id = ?2",
                params![collection_id, id.to_string()],
                Self::row_to_source_ref,
            )
            .optional()?;
        Ok(result)
    }

    fn upsert_index(&self, table: &JoinTable, data_path: &Path) -> JoinResult<()> {
        let _index_lock = FileLock::acquire_exclusive(&self.index_lock_path, DEFAULT_LOCK_TIMEOUT)?;
        let conn = self.conn.lock().expect("index mutex poisoned");
        conn.execute(
            "INSERT INTO source_refs (collection_id, id, time_stamp, join_source, ref_path)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection_id, id) DO UPDATE SET
                time_stamp = excluded.time_stamp,
                join_source = excluded.join_source,
                ref_path = excluded.ref_path",
            params![
                table.collection_id,
                table.id.to_string(),
                table.time_stamp.to_rfc3339(),
                table.join_source,
                data_path.to_string_lossy(),
            ],
        )?;
        Ok(())
    }

    fn remove_index_entry(&self, collection_id: &str, id: &Uuid) -> JoinResult<()> {
        let _index_lock = FileLock::acquire_exclusive(&self.index_lock_path, DEFAULT_LOCK_TIMEOUT)?;
        let conn = self.conn.lock().expect("index mutex poisoned");
        conn.execute(
            "DELETE FROM source_refs WHERE collection_id = ?1 AND id = ?2",
            params![collection_id, id.to_string()],
        )?;
        Ok(())
    }

    fn row_to_source_ref(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRef> {
        let collection_id: String = row.get(0)?;
        let id_str: String = row.get(1)?;
        let time_stamp_str: String = row.get(2)?;
        let join_source: String = row.get(3)?;
        let ref_path: String = row.get(4)?;

        let id = Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil());
        let time_stamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&time_stamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap());

        Ok(SourceRef {
            id,
            collection_id,
            time_stamp,
            join_source,
            ref_path: PathBuf::from(ref_path),
        })
    }
}

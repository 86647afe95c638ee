//! Closed error taxonomy for the join manager (spec §7).

/// Errors raised by the join manager subsystem.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// `Read`/`Remove` called with an `id` that does not parse as a UUID.
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// `Locate` found no index entry for `(collectionId, id)`.
    #[error("{0} not found")]
    NotFound(String),

    /// `Locate` found an index entry but the backing file is gone.
    #[error("Join source file missing: {0}")]
    MissingFile(String),

    /// A required `ProcessCSV` option was absent.
    #[error("Missing required option: {0}")]
    MissingOption(String),

    /// A `ProcessCSV` option had an invalid value (bad enum, out-of-range number).
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// `joinKey` does not appear in the CSV header row.
    #[error("Unknown join key: {0}")]
    UnknownJoinKey(String),

    /// `csvHeaderRow` / `csvDataStartRow` fall outside the file's line count.
    #[error("CSV shape error: {0}")]
    CsvShape(String),

    /// A data row's right-side key is empty after trimming.
    #[error("Empty key at row {0}")]
    EmptyKey(usize),

    /// A data row's right-side key duplicates a previously ingested key.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// `collectionKey` is not a declared key field of the provider.
    #[error("Collection key not in provider: {0}")]
    CollectionKeyNotInProvider(String),

    /// Uploaded file's content type is neither `text/csv` nor `application/csv`.
    #[error("Unsupported content type: {0}")]
    ContentType(String),

    /// The provider's `kind` is not `"feature"`.
    #[error("Unsupported provider kind: {0}")]
    ProviderKind(String),

    /// I/O failure on the write path (surfaced) or during a cleanup sweep (logged only).
    #[error("I/O error: {0}")]
    Io(String),
}

pub type JoinResult<T> = Result<T, JoinError>;

impl From<std::io::Error> for JoinError {
    fn from(err: std::io::Error) -> Self {
        JoinError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for JoinError {
    fn from(err: rusqlite::Error) -> Self {
        JoinError::Io(format!("index error: {err}"))
    }
}

impl From<serde_json::Error> for JoinError {
    fn from(err: serde_json::Error) -> Self {
        JoinError::Io(format!("JSON error: {err}"))
    }
}

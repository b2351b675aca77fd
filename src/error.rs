use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no chunks to index; ingest at least one document with text")]
    EmptyInput,

    #[error(
        "no index found at {}; index some documents first",
        .0.display()
    )]
    IndexUnavailable(PathBuf),

    #[error(
        "embedding dimension mismatch: index has {expected}, query has \
         {actual}; rebuild the index with the current model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "index was built with model '{index}' but '{configured}' is \
         configured; rebuild the index or switch models"
    )]
    EmbedderMismatch { index: String, configured: String },

    #[error(
        "index at {} is corrupt ({reason}); rebuild it",
        .path.display()
    )]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("failed to extract text from {}: {reason}", .path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Guidance states the user can resolve by ingesting documents, as
    /// opposed to failures that need a code or configuration change.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::EmptyInput | Error::IndexUnavailable(_))
    }

    pub(crate) fn corrupt(
        path: &std::path::Path,
        reason: impl Into<String>,
    ) -> Self {
        Error::CorruptIndex {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn map_candle_err(e: candle_core::Error) -> Error {
    Error::Embedding(format!("tensor computation error: {e}"))
}

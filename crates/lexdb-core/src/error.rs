use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing required fields. Recovered locally by skipping the unit.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Collection '{0}' has not been indexed yet; run the indexer first")]
    NotIndexed(String),

    #[error("Embedding dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Remote service failed: {0}")]
    RemoteService(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Error::Storage(err.to_string())
    }

    pub fn remote<E: std::fmt::Display>(err: E) -> Self {
        Error::RemoteService(err.to_string())
    }

    /// Errors that are recovered by skipping one file or row.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

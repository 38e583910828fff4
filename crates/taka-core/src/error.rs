//! Error types for taka-core

use thiserror::Error;

/// Result type alias using taka-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in taka-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent storage could not be opened at all
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Expected table missing after the database opened (schema mismatch)
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    /// Record or queue entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote document store failure (network or rejection)
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// Operation attempted without a user identity
    #[error("Unauthorized: no user identity present")]
    Unauthorized,

    /// Record failed required-field validation
    #[error("Validation rejected: {0}")]
    ValidationRejected(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::RemoteUnreachable(error.to_string())
    }
}

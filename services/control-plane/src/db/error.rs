//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted value could not be interpreted.
    #[error("invalid record: {0}")]
    Invalid(String),

    /// The write would violate a uniqueness rule.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A previous holder of the connection lock panicked.
    #[error("store lock poisoned")]
    Poisoned,
}

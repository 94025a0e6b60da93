//! Error types for the store boundary.

use thiserror::Error;

/// Errors surfaced by [`Store`](crate::Store) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request was well-formed but violates a data rule
    /// (duplicate active code, empty name, bad field value).
    #[error("{0}")]
    Validation(String),

    /// The named entity does not exist (or is not visible to the caller).
    #[error("{0}")]
    NotFound(String),

    /// The backing database cannot serve the request right now.
    /// Callers may retry these.
    #[error("almacén no disponible: {0}")]
    Unavailable(String),

    /// Schema setup failed while opening the database.
    #[error("{0}")]
    Migration(String),

    /// Any other database failure. Not retryable.
    #[error("error de base de datos: {0}")]
    Database(#[source] rusqlite::Error),
}

impl StoreError {
    /// True for faults that a bounded retry can reasonably clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Classifies raw SQLite failures into the store taxonomy, so `?` in
/// repository code lands busy/locked under [`StoreError::Unavailable`]
/// where retry policies can see them.
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreError::Unavailable(err.to_string())
                }
                rusqlite::ErrorCode::ConstraintViolation => StoreError::Validation(err.to_string()),
                _ => StoreError::Database(err),
            },
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

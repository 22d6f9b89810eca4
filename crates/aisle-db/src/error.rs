//! Database error types.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors raised by [`Db`](crate::Db) and its transactions.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to open database: {0}")]
    OpenError(String),

    /// Another connection held the write lock past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// A row did not match the struct it was read into.
    #[error("Row decode failed: {0}")]
    DeserializeError(String),

    #[error("Type conversion error: {0}")]
    TypeError(String),

    #[error("No rows returned")]
    NotFound,
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::DeserializeError(e.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
            rusqlite::Error::FromSqlConversionFailure(_, _, inner) => {
                DbError::TypeError(inner.to_string())
            }
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                DbError::Busy(e.to_string())
            }
            other => DbError::QueryError(other.to_string()),
        }
    }
}

//! Error types for the sqlite storage crate.

use thiserror::Error;

use tracklet_core::errors::{DatabaseError, Error as CoreError};

/// Storage-level failures, converted into the core error at the crate
/// boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(e) => {
                CoreError::Database(DatabaseError::QueryFailed(e.to_string()))
            }
            StorageError::Connection(e) => {
                CoreError::Database(DatabaseError::PoolError(e.to_string()))
            }
            StorageError::Pool(e) => CoreError::Database(DatabaseError::PoolError(e.to_string())),
            StorageError::Migration(message) => {
                CoreError::Database(DatabaseError::MigrationFailed(message))
            }
            StorageError::Io(e) => CoreError::Database(DatabaseError::Internal(e.to_string())),
        }
    }
}

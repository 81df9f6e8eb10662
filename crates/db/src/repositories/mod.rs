pub mod memory;
pub mod rest;
pub mod sql;

use thiserror::Error;

use leadflow_core::store::StoreError;

pub use memory::InMemoryRecordStore;
pub use rest::{RestRecordStore, RestSettings};
pub use sql::SqlRecordStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(
                error @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed),
            ) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Database(
                error @ (sqlx::Error::ColumnDecode { .. }
                | sqlx::Error::ColumnNotFound(_)
                | sqlx::Error::Decode(_)),
            ) => StoreError::Decode(error.to_string()),
            RepositoryError::Database(error) => StoreError::Transport(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

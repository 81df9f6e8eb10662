pub mod backend;
pub mod connection;
pub mod migrations;
pub mod repositories;

pub use backend::{open_store, BackendError};
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryRecordStore, RepositoryError, RestRecordStore, RestSettings, SqlRecordStore,
};

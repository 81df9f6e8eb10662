use std::sync::Arc;

use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::info;

use leadflow_core::config::{BackendConfig, BackendKind};
use leadflow_core::store::{RecordStore, StoreError};

use crate::repositories::{InMemoryRecordStore, RestRecordStore, RestSettings, SqlRecordStore};
use crate::{connect_with_settings, migrations};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to open sqlite database: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] MigrateError),
    #[error("failed to configure hosted backend: {0}")]
    Rest(#[from] StoreError),
}

/// Opens the record store selected by `backend.kind`. SQLite databases are
/// migrated before the store is handed out.
pub async fn open_store(config: &BackendConfig) -> Result<Arc<dyn RecordStore>, BackendError> {
    let store: Arc<dyn RecordStore> = match config.kind {
        BackendKind::Sqlite => {
            let pool = connect_with_settings(
                &config.database_url,
                config.max_connections,
                config.timeout_secs,
            )
            .await?;
            migrations::run_pending(&pool).await?;
            Arc::new(SqlRecordStore::new(pool))
        }
        BackendKind::Rest => {
            Arc::new(RestRecordStore::new(RestSettings::from_config(config)?)?)
        }
        BackendKind::Memory => Arc::new(InMemoryRecordStore::new()),
    };

    info!(
        event_name = "store.opened",
        backend = ?config.kind,
        "record store ready"
    );
    Ok(store)
}

use std::sync::Arc;
use std::time::Duration;

use leadflow_core::audit::{AuditSink, TracingAuditSink};
use leadflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leadflow_core::flows::{DefinitionError, FlowCatalog};
use leadflow_core::relay::{FallbackRelay, RelayError};
use leadflow_core::store::RecordStore;
use leadflow_core::submission::{RateLimiter, SubmissionCoordinator};
use leadflow_db::{open_store, BackendError};
use thiserror::Error;
use tracing::info;

use crate::relay::HttpFormRelay;
use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("record store could not be opened: {0}")]
    Store(#[source] BackendError),
    #[error("built-in flow catalog is invalid: {0}")]
    Catalog(#[source] DefinitionError),
    #[error("relay client could not be built: {0}")]
    Relay(#[source] RelayError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        backend = ?config.backend.kind,
        "starting application bootstrap"
    );

    let store = open_store(&config.backend).await.map_err(BootstrapError::Store)?;
    info!(
        event_name = "system.bootstrap.store_opened",
        correlation_id = "bootstrap",
        "record store ready"
    );

    let relay = HttpFormRelay::new(
        config.relay.clone(),
        Duration::from_secs(config.relay.timeout_secs.max(1)),
    )
    .map_err(BootstrapError::Relay)?;
    let state = assemble(&config, store, Arc::new(relay))?;

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        flow_types = state.catalog.flow_types().count(),
        "application bootstrap complete"
    );
    Ok(Application { config, state })
}

/// Wires the engine factory, coordinator and responders around an already
/// opened store and relay.
pub fn assemble(
    config: &AppConfig,
    store: Arc<dyn RecordStore>,
    relay: Arc<dyn FallbackRelay>,
) -> Result<AppState, BootstrapError> {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let catalog = FlowCatalog::builtin().map_err(BootstrapError::Catalog)?;
    let coordinator = SubmissionCoordinator::new(
        Arc::clone(&store),
        relay,
        RateLimiter::new(config.submission.rate_limit()),
        config.submission.coordinator_settings(),
        Arc::clone(&audit),
    );
    Ok(AppState::new(config.engine_settings(), catalog, store, Arc::new(coordinator), audit))
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::{BackendKind, ConfigOverrides, LoadOptions};
    use leadflow_core::store::{Collection, Selection};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_rest_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                backend_kind: Some(BackendKind::Rest),
                rest_url: Some("https://records.example.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("backend.api_key"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_opens_a_migrated_sqlite_store() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                backend_kind: Some(BackendKind::Sqlite),
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with an in-memory database");

        let store = &app.state.store;
        let total = store.count(Collection::Lead, &Selection::all()).await.expect("lead table");
        assert_eq!(total, 0);
        assert_eq!(app.state.catalog.flow_types().count(), 5);
    }
}

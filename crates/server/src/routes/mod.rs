//! HTTP routes for the chat widget, the FAQ assistant and the dashboard.
//!
//! - `POST   /widget/sessions`              open a guided flow
//! - `GET    /widget/sessions/{id}`         state and transcript
//! - `POST   /widget/sessions/{id}/input`   answer the current step (text or file)
//! - `POST   /widget/sessions/{id}/skip`    skip an optional step
//! - `POST   /widget/sessions/{id}/retry`   resubmit a rate-limited record
//! - `POST   /widget/sessions/{id}/visibility`  page trigger: open, close or toggle
//! - `DELETE /widget/sessions/{id}`         close and abandon the flow
//! - `POST   /assistant/ask`                canned FAQ answer
//! - `GET    /dashboard/properties/{id}/metrics`
//! - `POST   /dashboard/query`
//!
//! Sessions idle for `server.session_idle_secs` are abandoned and dropped.

pub mod assistant;
pub mod dashboard;
pub mod widget;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use leadflow_assistant::{DashboardResponder, IntentResponder};
use leadflow_core::audit::AuditSink;
use leadflow_core::flows::{EngineSettings, FlowCatalog, FlowEngine, FlowType};
use leadflow_core::store::RecordStore;
use leadflow_core::submission::SubmissionCoordinator;
use leadflow_core::widget::{ChatWidget, WidgetVisibility};

use crate::health;
use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub catalog: FlowCatalog,
    pub engine_settings: EngineSettings,
    pub store: Arc<dyn RecordStore>,
    pub coordinator: Arc<SubmissionCoordinator>,
    pub audit: Arc<dyn AuditSink>,
    pub sessions: SessionRegistry,
    pub intents: Arc<IntentResponder>,
    pub dashboard: DashboardResponder,
}

impl AppState {
    pub fn new(
        engine_settings: EngineSettings,
        catalog: FlowCatalog,
        store: Arc<dyn RecordStore>,
        coordinator: Arc<SubmissionCoordinator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            engine_settings,
            store,
            coordinator,
            audit,
            sessions: SessionRegistry::default(),
            intents: Arc::new(IntentResponder::builtin()),
            dashboard: DashboardResponder::new(),
        }
    }

    /// Builds a widget with its own engine and visibility controller; every
    /// visitor session gets one.
    pub fn new_widget(&self, flow_type: FlowType) -> ChatWidget {
        let engine = FlowEngine::new(
            self.catalog.clone(),
            self.engine_settings.clone(),
            Arc::clone(&self.audit),
        );
        ChatWidget::new(flow_type, engine, Arc::clone(&self.coordinator), WidgetVisibility::new())
    }

    pub async fn session(&self, id: &str) -> Option<Arc<ChatWidget>> {
        self.sessions.touch(id).await
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/widget/sessions", post(widget::open_session))
        .route(
            "/widget/sessions/{id}",
            get(widget::session_status).delete(widget::close_session),
        )
        .route("/widget/sessions/{id}/input", post(widget::send_input))
        .route("/widget/sessions/{id}/skip", post(widget::skip_step))
        .route("/widget/sessions/{id}/retry", post(widget::retry_submission))
        .route("/widget/sessions/{id}/visibility", post(widget::set_visibility))
        .route("/assistant/ask", post(assistant::ask))
        .route("/dashboard/properties/{id}/metrics", get(dashboard::property_metrics))
        .route("/dashboard/query", post(dashboard::query))
        .with_state(state.clone())
        .merge(health::router(state.store))
}

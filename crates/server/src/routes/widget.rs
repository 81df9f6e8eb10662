use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use leadflow_core::domain::upload::FileUpload;
use leadflow_core::errors::{ApplicationError, DomainError};
use leadflow_core::flows::{FlowState, FlowType, Resolution, StepInput, TranscriptEntry};
use leadflow_core::submission::OutcomeKind;
use leadflow_core::validation::ValidationError;
use leadflow_core::widget::{ChatWidget, WidgetReply};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub flow_type: String,
}

/// Either `text`, or a file given as `file_name` plus base64 `content_base64`.
#[derive(Debug, Default, Deserialize)]
pub struct InputRequest {
    pub text: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub content_base64: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityAction {
    Open,
    Close,
    Toggle,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub action: VisibilityAction,
}

#[derive(Debug, Serialize)]
pub struct VisibilityView {
    pub session_id: String,
    pub open: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub flow_type: FlowType,
    pub state: FlowState,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResolutionView {
    Completed { outcome: OutcomeKind },
    Deferred { retry_after_secs: u64 },
    Stale,
    Ignored,
}

impl From<&Resolution> for ResolutionView {
    fn from(value: &Resolution) -> Self {
        match value {
            Resolution::Completed { outcome, .. } => Self::Completed { outcome: *outcome },
            Resolution::Deferred { retry_after_secs } => {
                Self::Deferred { retry_after_secs: *retry_after_secs }
            }
            Resolution::Stale => Self::Stale,
            Resolution::Ignored => Self::Ignored,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplyView {
    pub session_id: String,
    pub state: FlowState,
    pub entries: Vec<TranscriptEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionView>,
}

impl ReplyView {
    fn new(session_id: &str, reply: WidgetReply) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: reply.state,
            entries: reply.entries,
            resolution: reply.resolution.as_ref().map(ResolutionView::from),
        }
    }
}

pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let flow_type = FlowType::from_str(&request.flow_type)
        .map_err(|error| ApiError::new(DomainError::from(error), request_id.clone()))?;

    let widget = Arc::new(state.new_widget(flow_type));
    let transcript = widget.open().map_err(|error| ApiError::new(error, request_id))?;
    let session_id = state.sessions.insert(Arc::clone(&widget)).await;

    info!(
        event_name = "widget.session_opened",
        correlation_id = %widget.correlation_id(),
        session_id = %session_id,
        flow_type = flow_type.as_str(),
        "widget session opened"
    );

    Ok((
        StatusCode::CREATED,
        Json(SessionView { session_id, flow_type, state: widget.state(), transcript }),
    ))
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let widget = find(&state, &id).await?;
    Ok(Json(SessionView {
        session_id: id,
        flow_type: widget.flow_type(),
        state: widget.state(),
        transcript: widget.transcript(),
    }))
}

pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InputRequest>,
) -> Result<Json<ReplyView>, ApiError> {
    let widget = find(&state, &id).await?;
    let input =
        step_input(request).map_err(|error| ApiError::new(error, widget.correlation_id()))?;
    let reply =
        widget.send(input).await.map_err(|error| ApiError::new(error, widget.correlation_id()))?;
    Ok(Json(ReplyView::new(&id, reply)))
}

pub async fn skip_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplyView>, ApiError> {
    let widget = find(&state, &id).await?;
    let reply =
        widget.skip().await.map_err(|error| ApiError::new(error, widget.correlation_id()))?;
    Ok(Json(ReplyView::new(&id, reply)))
}

/// A retry the limiter still refuses is reported as 429.
pub async fn retry_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplyView>, ApiError> {
    let widget = find(&state, &id).await?;
    let reply =
        widget.retry().await.map_err(|error| ApiError::new(error, widget.correlation_id()))?;
    if let Some(Resolution::Deferred { retry_after_secs }) = &reply.resolution {
        return Err(ApiError::new(
            ApplicationError::RateLimited { retry_after_secs: *retry_after_secs },
            widget.correlation_id(),
        ));
    }
    Ok(Json(ReplyView::new(&id, reply)))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state.sessions.remove(&id).await;
    let widget = removed.ok_or_else(|| session_not_found(&id))?;
    widget.close();
    info!(
        event_name = "widget.session_closed",
        correlation_id = %widget.correlation_id(),
        session_id = %id,
        "widget session closed"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Page triggers flip the widget's visibility flag; the session's listener
/// starts or abandons the flow, so the response is 202.
pub async fn set_visibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VisibilityRequest>,
) -> Result<(StatusCode, Json<VisibilityView>), ApiError> {
    let widget = find(&state, &id).await?;
    let visibility = widget.visibility();
    match request.action {
        VisibilityAction::Open => visibility.open(),
        VisibilityAction::Close => visibility.close(),
        VisibilityAction::Toggle => visibility.toggle(),
    }
    let view = VisibilityView { session_id: id, open: visibility.is_open() };
    Ok((StatusCode::ACCEPTED, Json(view)))
}

async fn find(state: &AppState, id: &str) -> Result<Arc<ChatWidget>, ApiError> {
    state.session(id).await.ok_or_else(|| session_not_found(id))
}

fn session_not_found(id: &str) -> ApiError {
    ApiError::not_found(format!("session `{id}`"), Uuid::new_v4().to_string())
}

fn step_input(request: InputRequest) -> Result<StepInput, DomainError> {
    let Some(file_name) = request.file_name else {
        return Ok(StepInput::Text(request.text.unwrap_or_default()));
    };
    let encoded = request.content_base64.unwrap_or_default();
    let bytes = STANDARD.decode(encoded.trim()).map_err(|error| {
        DomainError::Validation(ValidationError::InvalidFormat {
            field: "content_base64".to_string(),
            reason: format!("not valid base64: {error}"),
        })
    })?;
    let content_type = request.content_type.unwrap_or_default();
    Ok(StepInput::File(FileUpload::new(file_name, content_type, bytes)))
}

use axum::extract::State;
use axum::Json;
use leadflow_assistant::IntentReply;
use serde::Deserialize;
use tracing::debug;

use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub text: String,
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Json<IntentReply> {
    let reply = state.intents.respond(&request.text);
    debug!(
        event_name = "assistant.answered",
        intent = reply.intent.map(|intent| intent.as_str()).unwrap_or("fallback"),
        score = reply.score,
        "faq question answered"
    );
    Json(reply)
}

use axum::extract::{Path, State};
use axum::Json;
use leadflow_assistant::{
    demo_reports, load_metrics, MetricTopic, MetricsSource, PortfolioMetrics, PropertyMetrics,
};
use leadflow_core::domain::property::PropertyId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::AppState;

/// Property used for questions asked without one.
const DEMO_PROPERTY: &str = "demo";

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub property_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub property_id: PropertyId,
    pub source: MetricsSource,
    pub topic: MetricTopic,
    pub answer: String,
}

pub async fn property_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PropertyMetrics>, ApiError> {
    let metrics = load_metrics(state.store.as_ref(), &PropertyId(id))
        .await
        .map_err(|error| ApiError::new(error, Uuid::new_v4().to_string()))?;
    Ok(Json(metrics))
}

pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let loaded = match request.property_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => load_metrics(state.store.as_ref(), &PropertyId(id))
            .await
            .map_err(|error| ApiError::new(error, Uuid::new_v4().to_string()))?,
        None => {
            let property_id = PropertyId(DEMO_PROPERTY.to_string());
            let metrics = PortfolioMetrics::from_reports(&demo_reports(&property_id));
            PropertyMetrics { property_id, source: MetricsSource::Demo, metrics }
        }
    };

    let answer = state.dashboard.answer(&request.text, &loaded.metrics);
    Ok(Json(QueryResponse {
        property_id: loaded.property_id,
        source: loaded.source,
        topic: answer.topic,
        answer: answer.answer,
    }))
}

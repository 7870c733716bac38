use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use prediction_core::{Page, PredictionRecord, PredictionResponse, PredictionSummary};
use prediction_orchestrator::DEFAULT_HISTORY_LIMIT;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Identity;
use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct PredictRequest {
    pub ticker: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Unauthenticated readiness probe for the routing layer.
pub fn probe_routes() -> Router<AppState> {
    Router::new().route("/api/predict/health", get(models_health))
}

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/api/predict", post(predict))
        .route("/api/predict/history", get(history))
        .route("/api/predict/history/:id", get(history_detail))
}

/// Never waits on the registry lock; reports `reloading` while a reload holds it.
async fn models_health(State(state): State<AppState>) -> impl IntoResponse {
    let Some(models) = state.models.try_status() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "healthy": false, "status": "reloading", "models": null })),
        );
    };

    let healthy = state.models.is_ready();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "healthy": healthy,
            "status": if healthy { "ready" } else { "degraded" },
            "models": models,
        })),
    )
}

async fn predict(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<ApiResponse<PredictionResponse>>, AppError> {
    tracing::debug!(user = %identity.user_id, ticker = %req.ticker, "Prediction requested");

    let response = state
        .orchestrator
        .predict(&req.ticker, &identity.user_id)
        .await?;

    Ok(Json(ApiResponse::success(response)))
}

async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Page<PredictionSummary>>>, AppError> {
    let page = state
        .orchestrator
        .history(
            &identity.user_id,
            query.skip.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

async fn history_detail(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PredictionRecord>>, AppError> {
    let record = state
        .orchestrator
        .history_detail(id, &identity.user_id)
        .await?;

    Ok(Json(ApiResponse::success(record)))
}

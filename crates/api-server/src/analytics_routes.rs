use analytics::prediction_stats::{DEFAULT_LISTING_LIMIT, DEFAULT_TOP_STOCKS};
use analytics::{DashboardStats, PredictionListing, SectorStats, TopStock};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ml_engine::ModelStatus;
use prediction_core::Page;
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListingQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub ready: bool,
    pub models: ModelStatus,
}

/// Admin-only views; mounted behind the admin role check.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/stats", get(get_dashboard))
        .route("/api/admin/by-sector", get(get_sector_breakdown))
        .route("/api/admin/top-stocks", get(get_top_stocks))
        .route("/api/admin/predictions", get(get_all_predictions))
        .route("/api/admin/models/reload", post(reload_models))
}

async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardStats>>, AppError> {
    let stats = state.analytics.dashboard().await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn get_sector_breakdown(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SectorStats>>>, AppError> {
    let sectors = state.analytics.sector_breakdown().await?;
    Ok(Json(ApiResponse::success(sectors)))
}

async fn get_top_stocks(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<TopStock>>>, AppError> {
    let stocks = state
        .analytics
        .top_stocks(query.limit.unwrap_or(DEFAULT_TOP_STOCKS))
        .await?;
    Ok(Json(ApiResponse::success(stocks)))
}

async fn get_all_predictions(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<ApiResponse<Page<PredictionListing>>>, AppError> {
    let page = state
        .analytics
        .all_predictions(
            query.skip.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_LISTING_LIMIT),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Blocks predictions until every model directory has been re-read.
async fn reload_models(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ReloadResponse>>, AppError> {
    tracing::info!("Reloading models from {}", state.models.models_path().display());

    let models = state.models.reload().await.map_err(|e| {
        AppError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("Model reload failed: {e}"),
        )
    })?;

    Ok(Json(ApiResponse::success(ReloadResponse {
        ready: models.all_loaded(),
        models,
    })))
}

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use prediction_core::{DerivedRatios, StockFundamentals, StockInput};
use serde::Serialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Serialize)]
pub struct StockDetail {
    pub stock: StockFundamentals,
    /// `None` until ratios have been calculated
    pub ratios: Option<DerivedRatios>,
}

pub fn stock_routes() -> Router<AppState> {
    Router::new().route("/api/stocks/:ticker", get(get_stock))
}

pub fn stock_admin_routes() -> Router<AppState> {
    Router::new().route("/api/stocks", put(save_stock))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<StockDetail>>, AppError> {
    let (stock, ratios) = state.fundamentals.get_stock(&ticker).await?;
    Ok(Json(ApiResponse::success(StockDetail { stock, ratios })))
}

/// Upsert fundamentals and recompute the stock's ratios.
async fn save_stock(
    State(state): State<AppState>,
    Json(input): Json<StockInput>,
) -> Result<Json<ApiResponse<StockDetail>>, AppError> {
    let (stock, ratios) = state.fundamentals.save_fundamentals(input).await?;
    Ok(Json(ApiResponse::success(StockDetail {
        stock,
        ratios: Some(ratios),
    })))
}

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    DerivedRatios, NewPrediction, PredictionRecord, PredictionSummary, StockFundamentals,
    StockInput,
};

/// Store of stock fundamentals and their derived ratios
#[async_trait]
pub trait StockRepository: Send + Sync {
    /// `ticker` must already be normalized.
    async fn get_stock_by_ticker(&self, ticker: &str) -> Result<Option<StockFundamentals>>;

    /// Insert or fully replace a stock's fundamentals.
    async fn upsert_stock(&self, input: &StockInput) -> Result<StockFundamentals>;

    async fn get_derived_ratios(&self, stock_id: i64) -> Result<Option<DerivedRatios>>;

    /// Replace every field of the stock's ratio record.
    async fn save_derived_ratios(&self, ratios: &DerivedRatios) -> Result<DerivedRatios>;
}

/// Append-only audit store of predictions
#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn save_prediction(&self, prediction: &NewPrediction) -> Result<PredictionRecord>;

    async fn get_prediction(&self, id: i64) -> Result<Option<PredictionRecord>>;

    /// Newest first.
    async fn user_predictions(
        &self,
        user_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<PredictionSummary>>;

    async fn count_user_predictions(&self, user_id: &str) -> Result<i64>;
}

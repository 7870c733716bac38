use std::sync::Arc;

use fundamental_analysis::RatioCalculator;
use prediction_core::{
    normalize_ticker, DerivedRatios, PredictionError, PredictionResult, StockFundamentals,
    StockInput, StockRepository,
};

/// Writes stock fundamentals and keeps their derived ratios in step.
pub struct FundamentalsService {
    stocks: Arc<dyn StockRepository>,
    calculator: RatioCalculator,
}

impl FundamentalsService {
    pub fn new(stocks: Arc<dyn StockRepository>) -> Self {
        Self {
            stocks,
            calculator: RatioCalculator::new(),
        }
    }

    /// Upsert a stock, then recompute and replace its ratio record.
    pub async fn save_fundamentals(
        &self,
        mut input: StockInput,
    ) -> PredictionResult<(StockFundamentals, DerivedRatios)> {
        input.ticker = normalize_ticker(&input.ticker);
        if input.ticker.is_empty() {
            return Err(PredictionError::InvalidRequest("Ticker is required".to_string()));
        }
        input.company_name = input.company_name.trim().to_string();
        if input.company_name.is_empty() {
            return Err(PredictionError::InvalidRequest(
                "Company name is required".to_string(),
            ));
        }
        input.sector = input
            .sector
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let stock = self.stocks.upsert_stock(&input).await?;
        let ratios = self.calculator.calculate(&stock);
        let ratios = self.stocks.save_derived_ratios(&ratios).await?;

        tracing::info!(ticker = %stock.ticker, stock_id = stock.id, "Fundamentals saved, ratios recalculated");
        Ok((stock, ratios))
    }

    /// Stock plus its ratios, if they have been calculated.
    pub async fn get_stock(
        &self,
        ticker: &str,
    ) -> PredictionResult<(StockFundamentals, Option<DerivedRatios>)> {
        let ticker = normalize_ticker(ticker);
        let stock = self
            .stocks
            .get_stock_by_ticker(&ticker)
            .await?
            .ok_or_else(|| PredictionError::NotFound(format!("Stock with ticker {ticker} not found")))?;
        let ratios = self.stocks.get_derived_ratios(stock.id).await?;
        Ok((stock, ratios))
    }
}

use std::sync::Arc;

use chrono::Utc;
use explainability::Explainer;
use fundamental_analysis::{FeatureAssembler, FeatureVector};
use ml_engine::{MLError, ModelArtifact, ModelHandle};
use prediction_core::{
    normalize_ticker, ModelKey, ModelPrediction, NewPrediction, Page, PredictionError,
    PredictionRecord, PredictionRepository, PredictionResponse, PredictionResult,
    PredictionSummary, StockRepository,
};

pub mod ensemble;
pub mod fundamentals;

pub use ensemble::{vote, MAX_CONFIDENCE};
pub use fundamentals::FundamentalsService;

/// Attributions kept for the ensemble summary
pub const ENSEMBLE_TOP_FEATURES: usize = 5;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Runs the full ticker → recommendation pipeline and records the result.
pub struct PredictionOrchestrator {
    stocks: Arc<dyn StockRepository>,
    predictions: Arc<dyn PredictionRepository>,
    models: Arc<ModelHandle>,
    explainer: Explainer,
}

impl PredictionOrchestrator {
    pub fn new(
        stocks: Arc<dyn StockRepository>,
        predictions: Arc<dyn PredictionRepository>,
        models: Arc<ModelHandle>,
        explainer: Explainer,
    ) -> Self {
        Self {
            stocks,
            predictions,
            models,
            explainer,
        }
    }

    pub fn models(&self) -> &Arc<ModelHandle> {
        &self.models
    }

    /// Predict for one ticker on behalf of `user_id`.
    ///
    /// If the audit write fails the computed response is still returned,
    /// inside [`PredictionError::Persistence`].
    pub async fn predict(&self, ticker: &str, user_id: &str) -> PredictionResult<PredictionResponse> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return Err(PredictionError::InvalidRequest("Ticker is required".to_string()));
        }

        let stock = self
            .stocks
            .get_stock_by_ticker(&ticker)
            .await?
            .ok_or_else(|| PredictionError::NotFound(format!("Stock with ticker {ticker} not found")))?;

        let ratios = self.stocks.get_derived_ratios(stock.id).await?.ok_or_else(|| {
            PredictionError::PreconditionFailed(
                "Stock ratios not calculated. Please ensure all financial data is available."
                    .to_string(),
            )
        })?;

        let registry = self.models.snapshot().await;
        let jobs = [
            (
                registry.get(ModelKey::Valuation).map_err(model_error)?,
                FeatureAssembler::valuation(&stock.valuation),
            ),
            (
                registry.get(ModelKey::Health).map_err(model_error)?,
                FeatureAssembler::health(&ratios),
            ),
            (
                registry.get(ModelKey::Growth).map_err(model_error)?,
                FeatureAssembler::growth(&ratios),
            ),
        ];

        // Sampling attribution is CPU bound; keep it off the async workers.
        let explainer = self.explainer.clone();
        let [valuation, health, growth] = tokio::task::spawn_blocking(move || {
            let [a, b, c] = jobs;
            Ok::<_, MLError>([
                run_model(&explainer, &a.0, &a.1)?,
                run_model(&explainer, &b.0, &b.1)?,
                run_model(&explainer, &c.0, &c.1)?,
            ])
        })
        .await
        .map_err(|e| PredictionError::Unexpected(format!("Prediction task failed: {e}")))?
        .map_err(model_error)?;

        let top_features =
            ensemble::merge_top_features([&valuation, &health, &growth], ENSEMBLE_TOP_FEATURES);
        let ensemble = ensemble::vote(&valuation, &health, &growth, top_features);

        tracing::info!(
            ticker = %stock.ticker,
            user = %user_id,
            recommendation = %ensemble.recommendation,
            confidence = ensemble.confidence,
            "Prediction computed"
        );

        let new = NewPrediction {
            user_id: user_id.to_string(),
            stock: stock.info(),
            valuation,
            health,
            growth,
            ensemble,
            created_at: Utc::now(),
        };

        match self.predictions.save_prediction(&new).await {
            Ok(record) => Ok(response(new, Some(record.id))),
            Err(e) => {
                tracing::error!(ticker = %stock.ticker, "Failed to persist prediction: {:#}", e);
                Err(PredictionError::Persistence {
                    message: e.to_string(),
                    response: Box::new(response(new, None)),
                })
            }
        }
    }

    /// Newest-first prediction summaries for one user.
    pub async fn history(
        &self,
        user_id: &str,
        skip: i64,
        limit: i64,
    ) -> PredictionResult<Page<PredictionSummary>> {
        if skip < 0 {
            return Err(PredictionError::InvalidRequest("skip must be >= 0".to_string()));
        }
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(PredictionError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }

        let items = self.predictions.user_predictions(user_id, skip, limit).await?;
        let total = self.predictions.count_user_predictions(user_id).await?;
        Ok(Page {
            items,
            total,
            skip,
            limit,
        })
    }

    /// One full record, visible only to the user who requested it.
    pub async fn history_detail(&self, id: i64, user_id: &str) -> PredictionResult<PredictionRecord> {
        let record = self
            .predictions
            .get_prediction(id)
            .await?
            .ok_or_else(|| PredictionError::NotFound(format!("Prediction {id} not found")))?;

        if record.user_id != user_id {
            return Err(PredictionError::Forbidden(
                "Not authorized to view this prediction".to_string(),
            ));
        }
        Ok(record)
    }
}

fn run_model(
    explainer: &Explainer,
    model: &ModelArtifact,
    features: &FeatureVector,
) -> Result<ModelPrediction, MLError> {
    let inference = model.infer(&features.values)?;
    let explanation = explainer.explain(model, &inference, &features.names, &features.values);
    Ok(ModelPrediction {
        label: inference.label,
        confidence: inference.confidence,
        reason: explanation.reason,
        top_features: explanation.top_features,
    })
}

fn response(new: NewPrediction, prediction_id: Option<i64>) -> PredictionResponse {
    PredictionResponse {
        stock_info: new.stock,
        model1: new.valuation,
        model2: new.health,
        model3: new.growth,
        ensemble: new.ensemble,
        prediction_id,
        predicted_at: new.created_at,
    }
}

fn model_error(err: MLError) -> PredictionError {
    match err {
        MLError::ModelNotLoaded(key) => PredictionError::ModelUnavailable(key),
        other => PredictionError::Unexpected(other.to_string()),
    }
}

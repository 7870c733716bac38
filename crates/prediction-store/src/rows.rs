use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use prediction_core::{
    DerivedRatios, EnsemblePrediction, FeatureAttribution, FundamentalHistory, ModelPrediction,
    PredictionRecord, Recommendation, StockFundamentals, StockInfo,
    ValuationRatios,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StockRow {
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub current_price: Option<f64>,
    pub price_1y_ago: Option<f64>,
    pub history_json: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<StockRow> for StockFundamentals {
    type Error = anyhow::Error;

    fn try_from(row: StockRow) -> Result<Self> {
        let history: FundamentalHistory = serde_json::from_str(&row.history_json)?;
        Ok(StockFundamentals {
            id: row.id,
            ticker: row.ticker,
            company_name: row.company_name,
            sector: row.sector,
            valuation: ValuationRatios {
                pe_ratio: row.pe_ratio,
                pb_ratio: row.pb_ratio,
                roe: row.roe,
                profit_margin: row.profit_margin,
                debt_equity: row.debt_equity,
                current_ratio: row.current_ratio,
                eps: row.eps,
                current_price: row.current_price,
                price_1y_ago: row.price_1y_ago,
            },
            history,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RatioRow {
    pub stock_id: i64,
    pub ticker: String,
    pub revenue_growth_1y: Option<f64>,
    pub ebitda_growth_1y: Option<f64>,
    pub equity_growth: Option<f64>,
    pub debt_trend: Option<f64>,
    pub cash_trend: Option<f64>,
    pub working_capital_trend: Option<f64>,
    pub leverage_change: Option<f64>,
    pub debt_to_equity_2025: Option<f64>,
    pub revenue_cagr_2y: Option<f64>,
    pub ebitda_cagr_2y: Option<f64>,
    pub book_value_cagr_2y: Option<f64>,
    pub revenue_volatility: Option<f64>,
    pub ebitda_volatility: Option<f64>,
    pub revenue_acceleration: Option<f64>,
    pub ebitda_acceleration: Option<f64>,
    pub capex_trend: Option<f64>,
    pub working_capital_trend_2y: Option<f64>,
    pub calculated_at: DateTime<Utc>,
}

impl From<RatioRow> for DerivedRatios {
    fn from(row: RatioRow) -> Self {
        DerivedRatios {
            stock_id: row.stock_id,
            ticker: row.ticker,
            revenue_growth_1y: row.revenue_growth_1y,
            ebitda_growth_1y: row.ebitda_growth_1y,
            equity_growth: row.equity_growth,
            debt_trend: row.debt_trend,
            cash_trend: row.cash_trend,
            working_capital_trend: row.working_capital_trend,
            leverage_change: row.leverage_change,
            debt_to_equity_2025: row.debt_to_equity_2025,
            revenue_cagr_2y: row.revenue_cagr_2y,
            ebitda_cagr_2y: row.ebitda_cagr_2y,
            book_value_cagr_2y: row.book_value_cagr_2y,
            revenue_volatility: row.revenue_volatility,
            ebitda_volatility: row.ebitda_volatility,
            revenue_acceleration: row.revenue_acceleration,
            ebitda_acceleration: row.ebitda_acceleration,
            capex_trend: row.capex_trend,
            working_capital_trend_2y: row.working_capital_trend_2y,
            calculated_at: Some(row.calculated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PredictionRow {
    pub id: i64,
    pub user_id: String,
    pub stock_id: i64,
    pub ticker: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub model1_prediction: String,
    pub model1_confidence: f64,
    pub model1_reason: String,
    pub model1_top_features: String,
    pub model2_prediction: String,
    pub model2_confidence: f64,
    pub model2_reason: String,
    pub model2_top_features: String,
    pub model3_prediction: String,
    pub model3_confidence: f64,
    pub model3_reason: String,
    pub model3_top_features: String,
    pub final_recommendation: String,
    pub final_confidence: f64,
    pub final_reasoning: String,
    pub overall_top_features: String,
    pub created_at: DateTime<Utc>,
}

fn features(json: &str) -> Result<Vec<FeatureAttribution>> {
    Ok(serde_json::from_str(json)?)
}

pub(crate) fn recommendation(value: &str) -> Result<Recommendation> {
    value.parse().map_err(|e: String| anyhow!(e))
}

impl TryFrom<PredictionRow> for PredictionRecord {
    type Error = anyhow::Error;

    fn try_from(row: PredictionRow) -> Result<Self> {
        Ok(PredictionRecord {
            id: row.id,
            user_id: row.user_id,
            stock: StockInfo {
                id: row.stock_id,
                ticker: row.ticker,
                company_name: row.company_name,
                sector: row.sector,
            },
            valuation: ModelPrediction {
                label: row.model1_prediction,
                confidence: row.model1_confidence,
                reason: row.model1_reason,
                top_features: features(&row.model1_top_features)?,
            },
            health: ModelPrediction {
                label: row.model2_prediction,
                confidence: row.model2_confidence,
                reason: row.model2_reason,
                top_features: features(&row.model2_top_features)?,
            },
            growth: ModelPrediction {
                label: row.model3_prediction,
                confidence: row.model3_confidence,
                reason: row.model3_reason,
                top_features: features(&row.model3_top_features)?,
            },
            ensemble: EnsemblePrediction {
                recommendation: recommendation(&row.final_recommendation)?,
                confidence: row.final_confidence,
                reasoning: row.final_reasoning,
                top_features: features(&row.overall_top_features)?,
            },
            created_at: row.created_at,
        })
    }
}

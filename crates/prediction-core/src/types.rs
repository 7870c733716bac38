use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper-case and trim a ticker symbol. Applied at every read/write boundary.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// Sector label reported for stocks that have none.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Serialize a missing sector as [`UNKNOWN_SECTOR`] instead of `null`.
pub fn serialize_sector<S>(sector: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(sector.as_deref().unwrap_or(UNKNOWN_SECTOR))
}

/// Point-in-time valuation ratios for a stock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationRatios {
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub pb_ratio: Option<f64>,
    #[serde(default)]
    pub roe: Option<f64>,
    #[serde(default)]
    pub profit_margin: Option<f64>,
    #[serde(default)]
    pub debt_equity: Option<f64>,
    #[serde(default)]
    pub current_ratio: Option<f64>,
    #[serde(default)]
    pub eps: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub price_1y_ago: Option<f64>,
}

impl ValuationRatios {
    /// Look up a ratio by its feature name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "pe_ratio" => self.pe_ratio,
            "pb_ratio" => self.pb_ratio,
            "roe" => self.roe,
            "profit_margin" => self.profit_margin,
            "debt_equity" => self.debt_equity,
            "current_ratio" => self.current_ratio,
            "eps" => self.eps,
            "current_price" => self.current_price,
            "price_1y_ago" => self.price_1y_ago,
            _ => None,
        }
    }
}

/// Per-share line items for a single fiscal year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerShareFundamentals {
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub ebitda: Option<f64>,
    #[serde(default)]
    pub book_value: Option<f64>,
    #[serde(default)]
    pub debt: Option<f64>,
    #[serde(default)]
    pub cash: Option<f64>,
    #[serde(default)]
    pub working_capital: Option<f64>,
    #[serde(default)]
    pub capex: Option<f64>,
}

/// Three consecutive years of per-share fundamentals (Y-2, Y-1, Y)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalHistory {
    #[serde(default)]
    pub two_years_ago: PerShareFundamentals,
    #[serde(default)]
    pub last_year: PerShareFundamentals,
    #[serde(default)]
    pub current: PerShareFundamentals,
}

/// Stored stock with its valuation ratios and multi-year history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockFundamentals {
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    #[serde(serialize_with = "serialize_sector")]
    pub sector: Option<String>,
    pub valuation: ValuationRatios,
    pub history: FundamentalHistory,
    pub updated_at: DateTime<Utc>,
}

impl StockFundamentals {
    pub fn info(&self) -> StockInfo {
        StockInfo {
            id: self.id,
            ticker: self.ticker.clone(),
            company_name: self.company_name.clone(),
            sector: self.sector.clone(),
        }
    }
}

/// Create-or-replace payload for a stock's fundamentals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockInput {
    pub ticker: String,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub valuation: ValuationRatios,
    #[serde(default)]
    pub history: FundamentalHistory,
}

/// Ratios derived from a stock's fundamentals, one record per stock.
///
/// The 1-year growth metrics always carry a value (0.0 when undefined);
/// volatility, acceleration and leverage metrics stay `None` when their
/// inputs are undefined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedRatios {
    pub stock_id: i64,
    pub ticker: String,

    // Health model inputs
    pub revenue_growth_1y: Option<f64>,
    pub ebitda_growth_1y: Option<f64>,
    pub equity_growth: Option<f64>,
    pub debt_trend: Option<f64>,
    pub cash_trend: Option<f64>,
    pub working_capital_trend: Option<f64>,
    pub leverage_change: Option<f64>,
    pub debt_to_equity_2025: Option<f64>,

    // Growth model inputs
    pub revenue_cagr_2y: Option<f64>,
    pub ebitda_cagr_2y: Option<f64>,
    pub book_value_cagr_2y: Option<f64>,
    pub revenue_volatility: Option<f64>,
    pub ebitda_volatility: Option<f64>,
    pub revenue_acceleration: Option<f64>,
    pub ebitda_acceleration: Option<f64>,
    pub capex_trend: Option<f64>,
    pub working_capital_trend_2y: Option<f64>,

    pub calculated_at: Option<DateTime<Utc>>,
}

impl DerivedRatios {
    /// Look up a derived ratio by its feature name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "revenue_growth_1y" => self.revenue_growth_1y,
            "ebitda_growth_1y" => self.ebitda_growth_1y,
            "equity_growth" => self.equity_growth,
            "debt_trend" => self.debt_trend,
            "cash_trend" => self.cash_trend,
            "working_capital_trend" => self.working_capital_trend,
            "leverage_change" => self.leverage_change,
            "debt_to_equity_2025" => self.debt_to_equity_2025,
            "revenue_cagr_2y" => self.revenue_cagr_2y,
            "ebitda_cagr_2y" => self.ebitda_cagr_2y,
            "book_value_cagr_2y" => self.book_value_cagr_2y,
            "revenue_volatility" => self.revenue_volatility,
            "ebitda_volatility" => self.ebitda_volatility,
            "revenue_acceleration" => self.revenue_acceleration,
            "ebitda_acceleration" => self.ebitda_acceleration,
            "capex_trend" => self.capex_trend,
            "working_capital_trend_2y" => self.working_capital_trend_2y,
            _ => None,
        }
    }
}

/// The three classifiers served by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKey {
    Valuation,
    Health,
    Growth,
}

impl ModelKey {
    pub const ALL: [ModelKey; 3] = [ModelKey::Valuation, ModelKey::Health, ModelKey::Growth];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKey::Valuation => "valuation",
            ModelKey::Health => "health",
            ModelKey::Growth => "growth",
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "valuation" => Ok(ModelKey::Valuation),
            "health" => Ok(ModelKey::Health),
            "growth" => Ok(ModelKey::Growth),
            other => Err(format!("unknown model key: {other}")),
        }
    }
}

/// One feature's contribution to a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub name: String,
    /// Raw (untransformed) feature value
    pub value: f64,
    /// Non-negative contribution magnitude
    pub impact: f64,
}

/// Output of a single model pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub label: String,
    pub confidence: f64,
    pub reason: String,
    pub top_features: Vec<FeatureAttribution>,
}

/// Final recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Buy => "BUY",
            Recommendation::Sell => "SELL",
            Recommendation::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Recommendation::Buy),
            "SELL" => Ok(Recommendation::Sell),
            "HOLD" => Ok(Recommendation::Hold),
            other => Err(format!("unknown recommendation: {other}")),
        }
    }
}

/// Ensemble vote over the three model outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub reasoning: String,
    pub top_features: Vec<FeatureAttribution>,
}

/// Identity snapshot of the stock a prediction was made for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockInfo {
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    #[serde(serialize_with = "serialize_sector")]
    pub sector: Option<String>,
}

/// Full prediction payload returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub stock_info: StockInfo,
    pub model1: ModelPrediction,
    pub model2: ModelPrediction,
    pub model3: ModelPrediction,
    pub ensemble: EnsemblePrediction,
    /// `None` when the audit write failed
    pub prediction_id: Option<i64>,
    pub predicted_at: DateTime<Utc>,
}

/// Audit row before it has been assigned an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrediction {
    pub user_id: String,
    pub stock: StockInfo,
    pub valuation: ModelPrediction,
    pub health: ModelPrediction,
    pub growth: ModelPrediction,
    pub ensemble: EnsemblePrediction,
    pub created_at: DateTime<Utc>,
}

/// Immutable prediction audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub user_id: String,
    pub stock: StockInfo,
    pub valuation: ModelPrediction,
    pub health: ModelPrediction,
    pub growth: ModelPrediction,
    pub ensemble: EnsemblePrediction,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_new(id: i64, new: NewPrediction) -> Self {
        Self {
            id,
            user_id: new.user_id,
            stock: new.stock,
            valuation: new.valuation,
            health: new.health,
            growth: new.growth,
            ensemble: new.ensemble,
            created_at: new.created_at,
        }
    }

    pub fn summary(&self) -> PredictionSummary {
        PredictionSummary {
            id: self.id,
            ticker: self.stock.ticker.clone(),
            company_name: self.stock.company_name.clone(),
            sector: self.stock.sector.clone(),
            final_recommendation: self.ensemble.recommendation,
            final_confidence: self.ensemble.confidence,
            predicted_at: self.created_at,
        }
    }
}

/// History list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    #[serde(serialize_with = "serialize_sector")]
    pub sector: Option<String>,
    pub final_recommendation: Recommendation,
    pub final_confidence: f64,
    pub predicted_at: DateTime<Utc>,
}

/// One page of results plus the unpaged total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

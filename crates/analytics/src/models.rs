use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOverview {
    pub total_predictions: i64,
    pub buy_count: i64,
    pub sell_count: i64,
    pub hold_count: i64,
    /// Percentages of the total, 0-100, rounded to 2 dp
    pub buy_percentage: f64,
    pub sell_percentage: f64,
    pub hold_percentage: f64,
    pub average_confidence: f64,
    pub predictions_today: i64,
    pub predictions_this_week: i64,
    pub predictions_this_month: i64,
    pub total_stocks: i64,
    pub total_sectors: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SectorStats {
    pub sector: String,
    pub total: i64,
    pub buy: i64,
    pub sell: i64,
    pub hold: i64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopStock {
    pub ticker: String,
    pub company_name: String,
    pub prediction_count: i64,
    pub most_common_prediction: String,
    pub most_common_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub overview: PredictionOverview,
    pub sector_breakdown: Vec<SectorStats>,
    pub top_predicted_stocks: Vec<TopStock>,
}

/// Row of the admin prediction listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PredictionListing {
    pub id: i64,
    pub user_id: String,
    pub ticker: String,
    pub company_name: String,
    #[serde(serialize_with = "prediction_core::serialize_sector")]
    pub sector: Option<String>,
    pub final_recommendation: String,
    pub final_confidence: f64,
    pub predicted_at: DateTime<Utc>,
}

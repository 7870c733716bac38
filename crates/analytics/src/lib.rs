pub mod models;
pub mod prediction_stats;

pub use models::*;
pub use prediction_stats::PredictionAnalytics;

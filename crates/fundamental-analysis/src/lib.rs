//! Ratio derivation from multi-year fundamentals and per-model feature assembly.

pub mod features;
pub mod ratios;

pub use features::{FeatureAssembler, FeatureVector, GROWTH_FEATURES, HEALTH_FEATURES, VALUATION_FEATURES};
pub use ratios::{acceleration, cagr, growth, safe_ratio, volatility, RatioCalculator};

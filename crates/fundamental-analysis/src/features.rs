use prediction_core::{DerivedRatios, ValuationRatios};
use std::collections::HashMap;

pub const VALUATION_FEATURES: [&str; 5] =
    ["pe_ratio", "pb_ratio", "roe", "debt_equity", "profit_margin"];

pub const HEALTH_FEATURES: [&str; 8] = [
    "revenue_growth_1y",
    "ebitda_growth_1y",
    "equity_growth",
    "debt_trend",
    "cash_trend",
    "working_capital_trend",
    "leverage_change",
    "debt_to_equity_2025",
];

pub const GROWTH_FEATURES: [&str; 9] = [
    "revenue_cagr_2y",
    "ebitda_cagr_2y",
    "book_value_cagr_2y",
    "revenue_volatility",
    "ebitda_volatility",
    "revenue_acceleration",
    "ebitda_acceleration",
    "capex_trend",
    "working_capital_trend_2y",
];

/// Ordered model input with the parallel name list and a name lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub names: Vec<String>,
    pub by_name: HashMap<String, f64>,
}

impl FeatureVector {
    /// Build from an ordered name list; missing or non-finite values become 0.0.
    pub fn from_lookup<F>(names: &[&str], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<f64>,
    {
        let values: Vec<f64> = names
            .iter()
            .map(|name| lookup(name).filter(|v| v.is_finite()).unwrap_or(0.0))
            .collect();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let by_name = names.iter().cloned().zip(values.iter().copied()).collect();

        Self {
            values,
            names,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Selects and orders the fixed input vector for each model.
pub struct FeatureAssembler;

impl FeatureAssembler {
    pub fn valuation(ratios: &ValuationRatios) -> FeatureVector {
        FeatureVector::from_lookup(&VALUATION_FEATURES, |name| ratios.get(name))
    }

    pub fn health(ratios: &DerivedRatios) -> FeatureVector {
        FeatureVector::from_lookup(&HEALTH_FEATURES, |name| ratios.get(name))
    }

    pub fn growth(ratios: &DerivedRatios) -> FeatureVector {
        FeatureVector::from_lookup(&GROWTH_FEATURES, |name| ratios.get(name))
    }
}

//! Fixed-rubric vote over the valuation, health and growth labels.

use explainability::readable_name;
use prediction_core::{EnsemblePrediction, FeatureAttribution, ModelPrediction, Recommendation};

pub const MAX_CONFIDENCE: f64 = 0.95;

pub fn valuation_score(label: &str) -> i32 {
    match label.to_lowercase().as_str() {
        "undervalued" => 1,
        "fair" => -1,
        "overvalued" => -1,
        _ => 0,
    }
}

pub fn health_score(label: &str) -> i32 {
    match label.to_lowercase().as_str() {
        "excellent" => 1,
        "fair" => 0,
        "poor" => -1,
        _ => 0,
    }
}

pub fn growth_score(label: &str) -> i32 {
    match label.to_lowercase().as_str() {
        "strong_growth" | "moderate_growth" => 1,
        "weak_growth" => 0,
        "declining" => -1,
        _ => 0,
    }
}

/// Recommendation and agreement confidence for a total score in [-3, 3].
pub fn decide(total: i32) -> (Recommendation, f64) {
    let (recommendation, agreement) = if total >= 2 {
        (Recommendation::Buy, 0.85 + (total - 2) as f64 * 0.05)
    } else if total <= -2 {
        (Recommendation::Sell, 0.85 + (total + 2).abs() as f64 * 0.05)
    } else {
        (Recommendation::Hold, 0.75 + total.abs() as f64 * 0.05)
    };
    (recommendation, agreement.min(MAX_CONFIDENCE))
}

/// Blend agreement with the mean model confidence, rounded to 2 decimals
/// and bounded by [`MAX_CONFIDENCE`].
pub fn blended_confidence(agreement: f64, confidences: [f64; 3]) -> f64 {
    let mean = confidences.iter().map(|c| c.clamp(0.0, 1.0)).sum::<f64>() / 3.0;
    let blended = ((agreement + mean) / 2.0 * 100.0).round() / 100.0;
    blended.clamp(0.0, MAX_CONFIDENCE)
}

fn valuation_descriptor(label: &str) -> &'static str {
    match label.to_lowercase().as_str() {
        "undervalued" => "undervalued",
        "fair" => "fairly valued",
        "overvalued" => "overvalued",
        _ => "valued",
    }
}

fn health_descriptor(label: &str) -> &'static str {
    match label.to_lowercase().as_str() {
        "excellent" => "excellent financial health",
        "fair" => "fair financial health",
        "poor" => "concerning financial health",
        _ => "financial health",
    }
}

fn growth_descriptor(label: &str) -> &'static str {
    match label.to_lowercase().as_str() {
        "strong_growth" => "strong growth trajectory",
        "moderate_growth" => "moderate growth potential",
        "weak_growth" => "weak growth signals",
        "declining" => "declining performance",
        _ => "growth",
    }
}

pub fn reasoning(
    recommendation: Recommendation,
    valuation: &str,
    health: &str,
    growth: &str,
    top_feature: Option<&FeatureAttribution>,
) -> String {
    let (v, h, g) = (
        valuation_descriptor(valuation),
        health_descriptor(health),
        growth_descriptor(growth),
    );
    let mut text = match recommendation {
        Recommendation::Buy => format!(
            "All three models indicate positive signals. The stock is {v} with {h} and {g}."
        ),
        Recommendation::Sell => format!(
            "Multiple models show concerning signals. The stock is {v} with {h} and {g}."
        ),
        Recommendation::Hold => format!(
            "Mixed signals from the models. The stock is {v} with {h} and {g}. Further analysis recommended."
        ),
    };
    if let Some(feature) = top_feature {
        text.push_str(&format!(
            " {} is the most significant factor influencing this recommendation.",
            readable_name(&feature.name)
        ));
    }
    text
}

/// Merge per-model attributions into the overall top list. The sort is
/// stable, so equal impacts keep model order.
pub fn merge_top_features(models: [&ModelPrediction; 3], limit: usize) -> Vec<FeatureAttribution> {
    let mut all: Vec<FeatureAttribution> = models
        .iter()
        .flat_map(|m| m.top_features.iter().cloned())
        .collect();
    all.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    all.truncate(limit);
    all
}

/// Combine the three model outputs into a single recommendation.
pub fn vote(
    valuation: &ModelPrediction,
    health: &ModelPrediction,
    growth: &ModelPrediction,
    top_features: Vec<FeatureAttribution>,
) -> EnsemblePrediction {
    let total = valuation_score(&valuation.label)
        + health_score(&health.label)
        + growth_score(&growth.label);
    let (recommendation, agreement) = decide(total);
    let confidence = blended_confidence(
        agreement,
        [valuation.confidence, health.confidence, growth.confidence],
    );
    let reasoning = reasoning(
        recommendation,
        &valuation.label,
        &health.label,
        &growth.label,
        top_features.first(),
    );

    EnsemblePrediction {
        recommendation,
        confidence,
        reasoning,
        top_features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(label: &str, confidence: f64) -> ModelPrediction {
        ModelPrediction {
            label: label.to_string(),
            confidence,
            reason: String::new(),
            top_features: vec![],
        }
    }

    const VALUATIONS: [&str; 3] = ["UNDERVALUED", "FAIR", "OVERVALUED"];
    const HEALTHS: [&str; 3] = ["EXCELLENT", "FAIR", "POOR"];
    const GROWTHS: [&str; 4] = ["STRONG_GROWTH", "MODERATE_GROWTH", "WEAK_GROWTH", "DECLINING"];

    #[test]
    fn test_all_label_combinations() {
        let mut checked = 0;
        for v in VALUATIONS {
            for h in HEALTHS {
                for g in GROWTHS {
                    let total = valuation_score(v) + health_score(h) + growth_score(g);
                    let result = vote(
                        &prediction(v, 0.5),
                        &prediction(h, 0.5),
                        &prediction(g, 0.5),
                        vec![],
                    );
                    let expected = match total {
                        2 | 3 => Recommendation::Buy,
                        -3 | -2 => Recommendation::Sell,
                        _ => Recommendation::Hold,
                    };
                    assert_eq!(result.recommendation, expected, "{v}/{h}/{g}");
                    assert!((0.0..=MAX_CONFIDENCE).contains(&result.confidence));
                    checked += 1;
                }
            }
        }
        assert_eq!(checked, 36);
    }

    #[test]
    fn test_moderate_growth_counts_as_positive() {
        assert_eq!(growth_score("MODERATE_GROWTH"), growth_score("STRONG_GROWTH"));

        // Moderate growth lifts undervalued + fair health from HOLD to BUY.
        let buy = vote(
            &prediction("UNDERVALUED", 0.8),
            &prediction("FAIR", 0.6),
            &prediction("MODERATE_GROWTH", 0.9),
            vec![],
        );
        assert_eq!(buy.recommendation, Recommendation::Buy);
        assert!((buy.confidence - 0.81).abs() < 1e-12);
        assert_eq!(
            buy.reasoning,
            "All three models indicate positive signals. The stock is undervalued with \
             fair financial health and moderate growth potential."
        );

        let weak = vote(
            &prediction("UNDERVALUED", 0.8),
            &prediction("FAIR", 0.6),
            &prediction("WEAK_GROWTH", 0.7),
            vec![],
        );
        assert_eq!(weak.recommendation, Recommendation::Hold);

        // Against poor health and fair valuation it only pulls SELL back to HOLD.
        let hold = vote(
            &prediction("FAIR", 0.6),
            &prediction("POOR", 0.6),
            &prediction("MODERATE_GROWTH", 0.6),
            vec![],
        );
        assert_eq!(hold.recommendation, Recommendation::Hold);
        assert!((hold.confidence - 0.7).abs() < 1e-12);
        assert_eq!(
            hold.reasoning,
            "Mixed signals from the models. The stock is fairly valued with concerning \
             financial health and moderate growth potential. Further analysis recommended."
        );

        let sell = vote(
            &prediction("FAIR", 0.6),
            &prediction("POOR", 0.6),
            &prediction("DECLINING", 0.6),
            vec![],
        );
        assert_eq!(sell.recommendation, Recommendation::Sell);
    }

    #[test]
    fn test_case_insensitive_scores() {
        assert_eq!(valuation_score("undervalued"), 1);
        assert_eq!(valuation_score("Fair"), -1);
        assert_eq!(health_score("EXCELLENT"), 1);
        assert_eq!(growth_score("Moderate_Growth"), 1);
        assert_eq!(growth_score("sideways"), 0);
    }

    #[test]
    fn test_buy_scenario_confidence() {
        let result = vote(
            &prediction("undervalued", 0.8),
            &prediction("excellent", 0.9),
            &prediction("strong_growth", 0.7),
            vec![],
        );
        assert_eq!(result.recommendation, Recommendation::Buy);
        assert_eq!(decide(3).1, 0.9);
        assert!((result.confidence - 0.85).abs() < 1e-12);
        assert_eq!(
            result.reasoning,
            "All three models indicate positive signals. The stock is undervalued with \
             excellent financial health and strong growth trajectory."
        );
    }

    #[test]
    fn test_agreement_levels() {
        assert_eq!(decide(-3), (Recommendation::Sell, 0.9));
        assert_eq!(decide(-2), (Recommendation::Sell, 0.85));
        assert_eq!(decide(0).0, Recommendation::Hold);
        assert!((decide(1).1 - 0.8).abs() < 1e-12);
        assert!((decide(-1).1 - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_bounds() {
        let grid = [0.0, 0.3, 0.5, 0.85, 1.0];
        for total in -3..=3 {
            let (_, agreement) = decide(total);
            for a in grid {
                for b in grid {
                    for c in grid {
                        let conf = blended_confidence(agreement, [a, b, c]);
                        assert!((0.0..=MAX_CONFIDENCE).contains(&conf));
                    }
                }
            }
        }
    }

    #[test]
    fn test_hold_reasoning_names_top_feature() {
        let top = FeatureAttribution {
            name: "revenue_cagr_2y".to_string(),
            value: 0.2,
            impact: 0.4,
        };
        let text = reasoning(Recommendation::Hold, "FAIR", "FAIR", "WEAK_GROWTH", Some(&top));
        assert_eq!(
            text,
            "Mixed signals from the models. The stock is fairly valued with fair financial health \
             and weak growth signals. Further analysis recommended. 2-Year Revenue CAGR is the \
             most significant factor influencing this recommendation."
        );
    }

    #[test]
    fn test_merge_top_features_stable() {
        let attr = |name: &str, impact: f64| FeatureAttribution {
            name: name.to_string(),
            value: 1.0,
            impact,
        };
        let mut a = prediction("UNDERVALUED", 0.8);
        a.top_features = vec![attr("pe_ratio", 0.4), attr("roe", 0.1)];
        let mut b = prediction("EXCELLENT", 0.8);
        b.top_features = vec![attr("debt_trend", 0.4), attr("cash_trend", 0.5)];
        let mut c = prediction("STRONG_GROWTH", 0.8);
        c.top_features = vec![attr("capex_trend", 0.2), attr("revenue_cagr_2y", 0.05)];

        let merged = merge_top_features([&a, &b, &c], 5);
        let names: Vec<&str> = merged.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["cash_trend", "pe_ratio", "debt_trend", "capex_trend", "roe"]);
    }
}

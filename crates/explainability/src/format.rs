//! Reason text rendering.

pub const FALLBACK_REASON: &str = "Prediction based on multiple factors.";

/// Human-readable label for a feature name.
pub fn readable_name(name: &str) -> String {
    let known = match name {
        "pe_ratio" => "PE Ratio",
        "pb_ratio" => "PB Ratio",
        "roe" => "Return on Equity (ROE)",
        "profit_margin" => "Profit Margin",
        "debt_equity" => "Debt to Equity",
        "revenue_growth_1y" => "1-Year Revenue Growth",
        "ebitda_growth_1y" => "1-Year EBITDA Growth",
        "equity_growth" => "Equity Growth",
        "debt_trend" => "Debt Trend",
        "cash_trend" => "Cash Trend",
        "working_capital_trend" => "Working Capital Trend",
        "leverage_change" => "Leverage Change",
        "debt_to_equity_2025" => "Current Debt/Equity Ratio",
        "revenue_cagr_2y" => "2-Year Revenue CAGR",
        "ebitda_cagr_2y" => "2-Year EBITDA CAGR",
        "book_value_cagr_2y" => "2-Year Book Value CAGR",
        "revenue_volatility" => "Revenue Volatility",
        "ebitda_volatility" => "EBITDA Volatility",
        "revenue_acceleration" => "Revenue Acceleration",
        "ebitda_acceleration" => "EBITDA Acceleration",
        "capex_trend" => "CapEx Trend",
        "working_capital_trend_2y" => "2-Year Working Capital Trend",
        _ => return title_case(name),
    };
    known.to_string()
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Ratio-like names get two decimals, growth-like names a percentage,
/// everything else one decimal.
pub fn format_value(name: &str, value: f64) -> String {
    let lower = name.to_lowercase();
    if lower.contains("ratio") || lower.contains("equity") {
        format!("{value:.2}")
    } else if lower.contains("growth") || lower.contains("trend") || lower.contains("cagr") {
        format!("{:.1}%", value * 100.0)
    } else {
        format!("{value:.1}")
    }
}

pub fn importance_sentence(name: &str, value: f64, importance: f64) -> String {
    format!(
        "{} ({}) is a key factor with {:.1}% importance",
        readable_name(name),
        format_value(name, value),
        importance * 100.0
    )
}

pub fn attribution_sentence(name: &str, value: f64, contribution: f64) -> String {
    let direction = if contribution > 0.0 {
        "positively"
    } else {
        "negatively"
    };
    format!(
        "{} ({}) contributes {direction} with impact of {:.3}",
        readable_name(name),
        format_value(name, value),
        contribution.abs()
    )
}

pub fn coefficient_sentence(name: &str, value: f64, impact: f64) -> String {
    format!(
        "{} ({}) is a significant factor with impact score of {impact:.3}",
        readable_name(name),
        format_value(name, value)
    )
}

pub fn key_metrics_reason(names: &[&str]) -> String {
    if names.is_empty() {
        return FALLBACK_REASON.to_string();
    }
    let readable: Vec<String> = names.iter().map(|n| readable_name(n)).collect();
    format!("Prediction based on key metrics: {}.", readable.join(", "))
}

/// Join sentences with ". " and close with a period.
pub fn join_sentences(sentences: &[String]) -> String {
    if sentences.is_empty() {
        return FALLBACK_REASON.to_string();
    }
    format!("{}.", sentences.join(". "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_names() {
        assert_eq!(readable_name("roe"), "Return on Equity (ROE)");
        assert_eq!(readable_name("free_cash_FLOW"), "Free Cash Flow");
    }

    #[test]
    fn test_value_formatting_by_semantics() {
        assert_eq!(format_value("pe_ratio", 15.0), "15.00");
        assert_eq!(format_value("debt_equity", 0.4), "0.40");
        assert_eq!(format_value("revenue_growth_1y", 0.25), "25.0%");
        assert_eq!(format_value("revenue_cagr_2y", 0.2247), "22.5%");
        assert_eq!(format_value("roe", 18.0), "18.0");
    }

    #[test]
    fn test_sentences() {
        assert_eq!(
            importance_sentence("pe_ratio", 15.0, 0.4),
            "PE Ratio (15.00) is a key factor with 40.0% importance"
        );
        assert_eq!(
            attribution_sentence("capex_trend", -0.1, -0.0421),
            "CapEx Trend (-10.0%) contributes negatively with impact of 0.042"
        );
        assert_eq!(
            join_sentences(&["A".to_string(), "B".to_string()]),
            "A. B."
        );
        assert_eq!(join_sentences(&[]), FALLBACK_REASON);
    }
}

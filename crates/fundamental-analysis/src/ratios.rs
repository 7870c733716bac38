use chrono::Utc;
use prediction_core::{DerivedRatios, PerShareFundamentals, StockFundamentals};

/// Default returned by [`growth`] and [`cagr`] when inputs are undefined.
pub const DEFAULT_GROWTH: f64 = 0.0;

/// Period-over-period growth: `(new - old) / old`.
///
/// Returns [`DEFAULT_GROWTH`] when either side is missing or `old` is zero.
pub fn growth(new: Option<f64>, old: Option<f64>) -> f64 {
    match (new, old) {
        (Some(new), Some(old)) if old != 0.0 => (new - old) / old,
        _ => DEFAULT_GROWTH,
    }
}

/// Compound annual growth rate over `periods`.
///
/// Both endpoints must be strictly positive, otherwise [`DEFAULT_GROWTH`].
pub fn cagr(end: Option<f64>, start: Option<f64>, periods: u32) -> f64 {
    match (end, start) {
        (Some(end), Some(start)) if end > 0.0 && start > 0.0 && periods > 0 => {
            let rate = (end / start).powf(1.0 / periods as f64) - 1.0;
            if rate.is_finite() {
                rate
            } else {
                DEFAULT_GROWTH
            }
        }
        _ => DEFAULT_GROWTH,
    }
}

/// `numerator / denominator`, or `None` if either is missing or the denominator is zero.
pub fn safe_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Population standard deviation of two consecutive growth rates.
pub fn volatility(first: Option<f64>, second: Option<f64>) -> Option<f64> {
    let (a, b) = (first?, second?);
    let mean = (a + b) / 2.0;
    let variance = ((a - mean).powi(2) + (b - mean).powi(2)) / 2.0;
    Some(variance.max(0.0).sqrt())
}

/// Change in growth rate between consecutive periods.
pub fn acceleration(first: Option<f64>, second: Option<f64>) -> Option<f64> {
    Some(second? - first?)
}

/// Derives the health and growth model inputs from a stock's fundamentals.
pub struct RatioCalculator;

impl RatioCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Compute the full ratio record for a stock. Never fails; undefined
    /// inputs resolve to defaults or `None`.
    pub fn calculate(&self, stock: &StockFundamentals) -> DerivedRatios {
        let h = &stock.history;
        let mut ratios = self.calculate_from_history(&h.two_years_ago, &h.last_year, &h.current);
        ratios.stock_id = stock.id;
        ratios.ticker = stock.ticker.clone();
        ratios
    }

    pub fn calculate_from_history(
        &self,
        two_years_ago: &PerShareFundamentals,
        last_year: &PerShareFundamentals,
        current: &PerShareFundamentals,
    ) -> DerivedRatios {
        let debt_equity_prior = safe_ratio(last_year.debt, last_year.book_value);
        let debt_equity_current = safe_ratio(current.debt, current.book_value);
        let leverage_change = match (debt_equity_current, debt_equity_prior) {
            (Some(now), Some(before)) => Some(now - before),
            _ => None,
        };

        // The year-over-year inputs already carry growth's 0.0 default, so
        // volatility and acceleration are only undefined if those inputs are.
        let revenue_g1 = Some(growth(last_year.revenue, two_years_ago.revenue));
        let revenue_g2 = Some(growth(current.revenue, last_year.revenue));
        let ebitda_g1 = Some(growth(last_year.ebitda, two_years_ago.ebitda));
        let ebitda_g2 = Some(growth(current.ebitda, last_year.ebitda));

        DerivedRatios {
            revenue_growth_1y: Some(growth(current.revenue, last_year.revenue)),
            ebitda_growth_1y: Some(growth(current.ebitda, last_year.ebitda)),
            equity_growth: Some(growth(current.book_value, last_year.book_value)),
            debt_trend: Some(growth(current.debt, last_year.debt)),
            cash_trend: Some(growth(current.cash, last_year.cash)),
            working_capital_trend: Some(growth(current.working_capital, last_year.working_capital)),
            leverage_change,
            debt_to_equity_2025: debt_equity_current,

            revenue_cagr_2y: Some(cagr(current.revenue, two_years_ago.revenue, 2)),
            ebitda_cagr_2y: Some(cagr(current.ebitda, two_years_ago.ebitda, 2)),
            book_value_cagr_2y: Some(cagr(current.book_value, two_years_ago.book_value, 2)),
            revenue_volatility: volatility(revenue_g1, revenue_g2),
            ebitda_volatility: volatility(ebitda_g1, ebitda_g2),
            revenue_acceleration: acceleration(revenue_g1, revenue_g2),
            ebitda_acceleration: acceleration(ebitda_g1, ebitda_g2),
            capex_trend: Some(growth(current.capex, last_year.capex)),
            working_capital_trend_2y: Some(cagr(
                current.working_capital,
                two_years_ago.working_capital,
                2,
            )),

            calculated_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

impl Default for RatioCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year(revenue: f64, ebitda: f64, book: f64, debt: f64) -> PerShareFundamentals {
        PerShareFundamentals {
            revenue: Some(revenue),
            ebitda: Some(ebitda),
            book_value: Some(book),
            debt: Some(debt),
            cash: Some(2.0),
            working_capital: Some(3.0),
            capex: Some(1.0),
        }
    }

    #[test]
    fn test_growth_defaults_on_missing_or_zero() {
        assert_eq!(growth(None, Some(1.0)), 0.0);
        assert_eq!(growth(Some(1.0), None), 0.0);
        assert_eq!(growth(Some(5.0), Some(0.0)), 0.0);
        assert_eq!(growth(None, None), 0.0);
        assert!((growth(Some(15.0), Some(12.0)) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_cagr_round_trip() {
        for (end, start) in [(15.0, 10.0), (3.0, 7.5), (1.0, 1.0), (250.0, 0.4)] {
            let rate = cagr(Some(end), Some(start), 2);
            assert!((start * (1.0 + rate).powi(2) - end).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cagr_requires_positive_endpoints() {
        assert_eq!(cagr(Some(-1.0), Some(10.0), 2), 0.0);
        assert_eq!(cagr(Some(10.0), Some(0.0), 2), 0.0);
        assert_eq!(cagr(None, Some(10.0), 2), 0.0);
    }

    #[test]
    fn test_volatility_and_acceleration_propagate_none() {
        assert_eq!(volatility(None, Some(0.1)), None);
        assert_eq!(acceleration(Some(0.1), None), None);

        let vol = volatility(Some(0.2), Some(0.25)).unwrap();
        assert!((vol - 0.025).abs() < 1e-12);
        let acc = acceleration(Some(0.2), Some(0.25)).unwrap();
        assert!((acc - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_revenue_scenario() {
        let calc = RatioCalculator::new();
        let ratios = calc.calculate_from_history(
            &year(10.0, 4.0, 20.0, 10.0),
            &year(12.0, 5.0, 20.0, 10.0),
            &year(15.0, 6.0, 25.0, 10.0),
        );

        assert!((ratios.revenue_growth_1y.unwrap() - 0.25).abs() < 1e-12);
        assert!((ratios.revenue_cagr_2y.unwrap() - 0.2247).abs() < 1e-4);
        assert!((ratios.revenue_acceleration.unwrap() - 0.05).abs() < 1e-12);
        // D/E 0.5 -> 0.4
        assert!((ratios.leverage_change.unwrap() + 0.1).abs() < 1e-12);
        assert!((ratios.debt_to_equity_2025.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_missing_history_never_panics() {
        let calc = RatioCalculator::new();
        let empty = PerShareFundamentals::default();
        let ratios = calc.calculate_from_history(&empty, &empty, &empty);

        assert_eq!(ratios.revenue_growth_1y, Some(0.0));
        assert_eq!(ratios.revenue_cagr_2y, Some(0.0));
        assert_eq!(ratios.leverage_change, None);
        assert_eq!(ratios.debt_to_equity_2025, None);
        // growth defaults feed volatility, so it is defined
        assert_eq!(ratios.revenue_volatility, Some(0.0));
    }
}

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use prediction_core::{Page, PredictionError, PredictionResult};
use sqlx::SqlitePool;

use crate::models::{DashboardStats, PredictionListing, PredictionOverview, SectorStats, TopStock};

pub const DASHBOARD_TOP_STOCKS: i64 = 10;
pub const DEFAULT_TOP_STOCKS: i64 = 20;
pub const MAX_TOP_STOCKS: i64 = 100;
pub const DEFAULT_LISTING_LIMIT: i64 = 100;
pub const MAX_LISTING_LIMIT: i64 = 500;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(count: i64, total: i64) -> f64 {
    if total > 0 {
        round2(count as f64 / total as f64 * 100.0)
    } else {
        0.0
    }
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Read-only aggregates over the prediction audit log for the admin views.
pub struct PredictionAnalytics {
    pool: SqlitePool,
}

impl PredictionAnalytics {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self) -> PredictionResult<DashboardStats> {
        let stats = DashboardStats {
            overview: self.overview(Utc::now()).await?,
            sector_breakdown: self.sector_breakdown().await?,
            top_predicted_stocks: self.top_stocks(DASHBOARD_TOP_STOCKS).await?,
        };

        tracing::debug!(
            "Dashboard: {} predictions across {} sectors",
            stats.overview.total_predictions,
            stats.sector_breakdown.len()
        );

        Ok(stats)
    }

    /// Totals and recency counts. Day and month boundaries are taken in UTC.
    pub async fn overview(&self, now: DateTime<Utc>) -> PredictionResult<PredictionOverview> {
        let (total, buy, sell, hold, avg): (i64, i64, i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN final_recommendation = 'BUY' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN final_recommendation = 'SELL' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN final_recommendation = 'HOLD' THEN 1 ELSE 0 END), 0),
                   AVG(final_confidence)
            FROM predictions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let today = now.date_naive();
        let month_start = today.with_day(1).unwrap_or(today);

        let predictions_today = self.count_since(start_of(today)).await?;
        let predictions_this_week = self.count_since(now - chrono::Duration::days(7)).await?;
        let predictions_this_month = self.count_since(start_of(month_start)).await?;
        let total_stocks = self.count_table("SELECT COUNT(*) FROM stocks").await?;
        let total_sectors = self.count_table("SELECT COUNT(*) FROM sectors").await?;

        Ok(PredictionOverview {
            total_predictions: total,
            buy_count: buy,
            sell_count: sell,
            hold_count: hold,
            buy_percentage: percentage(buy, total),
            sell_percentage: percentage(sell, total),
            hold_percentage: percentage(hold, total),
            average_confidence: round2(avg.unwrap_or(0.0)),
            predictions_today,
            predictions_this_week,
            predictions_this_month,
            total_stocks,
            total_sectors,
        })
    }

    async fn count_since(&self, since: DateTime<Utc>) -> PredictionResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM predictions WHERE created_at >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await
                .map_err(anyhow::Error::from)?;
        Ok(count)
    }

    async fn count_table(&self, sql: &str) -> PredictionResult<i64> {
        let (count,): (i64,) = sqlx::query_as(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(count)
    }

    /// Per-sector recommendation counts; predictions without a sector are
    /// reported under "Unknown".
    pub async fn sector_breakdown(&self) -> PredictionResult<Vec<SectorStats>> {
        let rows: Vec<SectorStats> = sqlx::query_as(
            r#"
            SELECT COALESCE(sector, 'Unknown') AS sector,
                   COUNT(*) AS total,
                   SUM(CASE WHEN final_recommendation = 'BUY' THEN 1 ELSE 0 END) AS buy,
                   SUM(CASE WHEN final_recommendation = 'SELL' THEN 1 ELSE 0 END) AS sell,
                   SUM(CASE WHEN final_recommendation = 'HOLD' THEN 1 ELSE 0 END) AS hold,
                   COALESCE(AVG(final_confidence), 0.0) AS avg_confidence
            FROM predictions
            GROUP BY sector
            ORDER BY total DESC, sector
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        Ok(rows
            .into_iter()
            .map(|s| SectorStats {
                avg_confidence: round2(s.avg_confidence),
                ..s
            })
            .collect())
    }

    /// Most frequently predicted tickers with their most common recommendation.
    pub async fn top_stocks(&self, limit: i64) -> PredictionResult<Vec<TopStock>> {
        if !(1..=MAX_TOP_STOCKS).contains(&limit) {
            return Err(PredictionError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_TOP_STOCKS}"
            )));
        }

        let tickers: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT ticker, MAX(company_name), COUNT(*) AS prediction_count
            FROM predictions
            GROUP BY ticker
            ORDER BY prediction_count DESC, ticker
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let mut stocks = Vec::with_capacity(tickers.len());
        for (ticker, company_name, prediction_count) in tickers {
            let most_common: Option<(String, i64)> = sqlx::query_as(
                r#"
                SELECT final_recommendation, COUNT(*) AS cnt
                FROM predictions
                WHERE ticker = ?
                GROUP BY final_recommendation
                ORDER BY cnt DESC, final_recommendation
                LIMIT 1
                "#,
            )
            .bind(&ticker)
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

            let (most_common_prediction, most_common_count) =
                most_common.unwrap_or_else(|| ("N/A".to_string(), 0));

            stocks.push(TopStock {
                ticker,
                company_name,
                prediction_count,
                most_common_prediction,
                most_common_count,
            });
        }

        Ok(stocks)
    }

    /// Every prediction, newest first.
    pub async fn all_predictions(
        &self,
        skip: i64,
        limit: i64,
    ) -> PredictionResult<Page<PredictionListing>> {
        if skip < 0 {
            return Err(PredictionError::InvalidRequest("skip must be >= 0".to_string()));
        }
        if !(1..=MAX_LISTING_LIMIT).contains(&limit) {
            return Err(PredictionError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_LISTING_LIMIT}"
            )));
        }

        let items: Vec<PredictionListing> = sqlx::query_as(
            r#"
            SELECT id, user_id, ticker, company_name, sector,
                   final_recommendation, final_confidence, created_at AS predicted_at
            FROM predictions
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        let total = self.count_table("SELECT COUNT(*) FROM predictions").await?;

        Ok(Page {
            items,
            total,
            skip,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use prediction_core::{
        EnsemblePrediction, ModelPrediction, NewPrediction, PredictionRepository, Recommendation,
        StockFundamentals, StockInput, StockRepository,
    };
    use prediction_store::{PredictionDb, SqlitePredictionRepository, SqliteStockRepository};

    struct Fixture {
        analytics: PredictionAnalytics,
        stocks: SqliteStockRepository,
        predictions: SqlitePredictionRepository,
    }

    async fn fixture() -> Fixture {
        let db = PredictionDb::new("sqlite::memory:").await.unwrap();
        Fixture {
            analytics: PredictionAnalytics::new(db.pool().clone()),
            stocks: SqliteStockRepository::new(db.clone()),
            predictions: SqlitePredictionRepository::new(db),
        }
    }

    async fn stock(f: &Fixture, ticker: &str, sector: Option<&str>) -> StockFundamentals {
        f.stocks
            .upsert_stock(&StockInput {
                ticker: ticker.to_string(),
                company_name: format!("{ticker} Inc"),
                sector: sector.map(str::to_string),
                valuation: Default::default(),
                history: Default::default(),
            })
            .await
            .unwrap()
    }

    async fn record(
        f: &Fixture,
        stock: &StockFundamentals,
        recommendation: Recommendation,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) {
        let model = |label: &str| ModelPrediction {
            label: label.to_string(),
            confidence: 0.8,
            reason: String::new(),
            top_features: vec![],
        };
        f.predictions
            .save_prediction(&NewPrediction {
                user_id: "user-1".to_string(),
                stock: stock.info(),
                valuation: model("FAIR"),
                health: model("FAIR"),
                growth: model("WEAK_GROWTH"),
                ensemble: EnsemblePrediction {
                    recommendation,
                    confidence,
                    reasoning: String::new(),
                    top_features: vec![],
                },
                created_at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_overview() {
        let f = fixture().await;
        let overview = f.analytics.overview(Utc::now()).await.unwrap();
        assert_eq!(overview.total_predictions, 0);
        assert_eq!(overview.buy_percentage, 0.0);
        assert_eq!(overview.average_confidence, 0.0);
        assert!(f.analytics.sector_breakdown().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let f = fixture().await;
        let abc = stock(&f, "ABC", Some("Technology")).await;
        let xyz = stock(&f, "XYZ", None).await;

        let now = Utc::now();
        record(&f, &abc, Recommendation::Buy, 0.85, now).await;
        record(&f, &abc, Recommendation::Buy, 0.9, now).await;
        record(&f, &xyz, Recommendation::Hold, 0.7, now - Duration::days(3)).await;
        record(&f, &xyz, Recommendation::Sell, 0.8, now - Duration::days(60)).await;

        let overview = f.analytics.overview(now).await.unwrap();
        assert_eq!(overview.total_predictions, 4);
        assert_eq!(overview.buy_count, 2);
        assert_eq!(overview.sell_count, 1);
        assert_eq!(overview.hold_count, 1);
        assert_eq!(overview.buy_percentage, 50.0);
        assert_eq!(overview.hold_percentage, 25.0);
        assert!((overview.average_confidence - 0.81).abs() < 1e-9);
        assert!(overview.predictions_today >= 2);
        assert_eq!(overview.predictions_this_week, 3);
        assert_eq!(overview.total_stocks, 2);
        assert_eq!(overview.total_sectors, 1);
    }

    #[tokio::test]
    async fn test_sector_breakdown_reports_unknown() {
        let f = fixture().await;
        let abc = stock(&f, "ABC", Some("Technology")).await;
        let xyz = stock(&f, "XYZ", None).await;
        let now = Utc::now();
        record(&f, &abc, Recommendation::Buy, 0.9, now).await;
        record(&f, &abc, Recommendation::Sell, 0.6, now).await;
        record(&f, &xyz, Recommendation::Hold, 0.75, now).await;

        let sectors = f.analytics.sector_breakdown().await.unwrap();
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[0].sector, "Technology");
        assert_eq!((sectors[0].buy, sectors[0].sell, sectors[0].hold), (1, 1, 0));
        assert!((sectors[0].avg_confidence - 0.75).abs() < 1e-9);
        assert_eq!(sectors[1].sector, "Unknown");
        assert_eq!(sectors[1].hold, 1);

        let listing = f.analytics.all_predictions(0, 10).await.unwrap();
        let unsectored = listing.items.iter().find(|p| p.ticker == "XYZ").unwrap();
        assert_eq!(unsectored.sector, None);
        let json = serde_json::to_value(unsectored).unwrap();
        assert_eq!(json["sector"], "Unknown");
    }

    #[tokio::test]
    async fn test_top_stocks_most_common() {
        let f = fixture().await;
        let abc = stock(&f, "ABC", None).await;
        let xyz = stock(&f, "XYZ", None).await;
        let now = Utc::now();
        for rec in [Recommendation::Buy, Recommendation::Hold, Recommendation::Buy] {
            record(&f, &abc, rec, 0.8, now).await;
        }
        record(&f, &xyz, Recommendation::Sell, 0.8, now).await;

        let top = f.analytics.top_stocks(DEFAULT_TOP_STOCKS).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].ticker, "ABC");
        assert_eq!(top[0].prediction_count, 3);
        assert_eq!(top[0].most_common_prediction, "BUY");
        assert_eq!(top[0].most_common_count, 2);
        assert_eq!(top[1].most_common_prediction, "SELL");

        assert_eq!(f.analytics.top_stocks(1).await.unwrap().len(), 1);
        assert!(matches!(
            f.analytics.top_stocks(0).await,
            Err(PredictionError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_all_predictions_paging() {
        let f = fixture().await;
        let abc = stock(&f, "ABC", Some("Technology")).await;
        let now = Utc::now();
        for i in 0..5 {
            record(&f, &abc, Recommendation::Hold, 0.7, now - Duration::minutes(i)).await;
        }

        let page = f.analytics.all_predictions(1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].predicted_at >= page.items[1].predicted_at);
        assert_eq!(page.items[0].sector.as_deref(), Some("Technology"));

        assert!(f.analytics.all_predictions(0, MAX_LISTING_LIMIT + 1).await.is_err());
        assert!(f.analytics.all_predictions(-1, 10).await.is_err());
    }
}

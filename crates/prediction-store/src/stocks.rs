use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use prediction_core::{DerivedRatios, StockFundamentals, StockInput, StockRepository};

use crate::db::PredictionDb;
use crate::rows::{RatioRow, StockRow};

const STOCK_COLUMNS: &str = r#"
    s.id, s.ticker, s.company_name, sec.name AS sector,
    s.pe_ratio, s.pb_ratio, s.roe, s.profit_margin, s.debt_equity,
    s.current_ratio, s.eps, s.current_price, s.price_1y_ago,
    s.history_json, s.updated_at
"#;

pub struct SqliteStockRepository {
    db: PredictionDb,
}

impl SqliteStockRepository {
    pub fn new(db: PredictionDb) -> Self {
        Self { db }
    }

    async fn stock_by_id(&self, id: i64) -> Result<Option<StockFundamentals>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks s LEFT JOIN sectors sec ON sec.id = s.sector_id WHERE s.id = ?"
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(StockFundamentals::try_from).transpose()
    }
}

#[async_trait]
impl StockRepository for SqliteStockRepository {
    async fn get_stock_by_ticker(&self, ticker: &str) -> Result<Option<StockFundamentals>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks s LEFT JOIN sectors sec ON sec.id = s.sector_id WHERE s.ticker = ?"
        ))
        .bind(ticker)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(StockFundamentals::try_from).transpose()
    }

    async fn upsert_stock(&self, input: &StockInput) -> Result<StockFundamentals> {
        let history_json = serde_json::to_string(&input.history)?;
        let mut tx = self.db.pool().begin().await?;

        let sector_id: Option<i64> = match &input.sector {
            Some(name) => {
                sqlx::query("INSERT INTO sectors (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                let (id,): (i64,) = sqlx::query_as("SELECT id FROM sectors WHERE name = ?")
                    .bind(name)
                    .fetch_one(&mut *tx)
                    .await?;
                Some(id)
            }
            None => None,
        };

        let v = &input.valuation;
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO stocks (
                ticker, company_name, sector_id,
                pe_ratio, pb_ratio, roe, profit_margin, debt_equity,
                current_ratio, eps, current_price, price_1y_ago,
                history_json, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                company_name = excluded.company_name,
                sector_id = excluded.sector_id,
                pe_ratio = excluded.pe_ratio,
                pb_ratio = excluded.pb_ratio,
                roe = excluded.roe,
                profit_margin = excluded.profit_margin,
                debt_equity = excluded.debt_equity,
                current_ratio = excluded.current_ratio,
                eps = excluded.eps,
                current_price = excluded.current_price,
                price_1y_ago = excluded.price_1y_ago,
                history_json = excluded.history_json,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&input.ticker)
        .bind(&input.company_name)
        .bind(sector_id)
        .bind(v.pe_ratio)
        .bind(v.pb_ratio)
        .bind(v.roe)
        .bind(v.profit_margin)
        .bind(v.debt_equity)
        .bind(v.current_ratio)
        .bind(v.eps)
        .bind(v.current_price)
        .bind(v.price_1y_ago)
        .bind(&history_json)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.stock_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Stock {} vanished after upsert", input.ticker))
    }

    async fn get_derived_ratios(&self, stock_id: i64) -> Result<Option<DerivedRatios>> {
        let row = sqlx::query_as::<_, RatioRow>(
            r#"
            SELECT r.stock_id, s.ticker,
                   r.revenue_growth_1y, r.ebitda_growth_1y, r.equity_growth, r.debt_trend,
                   r.cash_trend, r.working_capital_trend, r.leverage_change, r.debt_to_equity_2025,
                   r.revenue_cagr_2y, r.ebitda_cagr_2y, r.book_value_cagr_2y,
                   r.revenue_volatility, r.ebitda_volatility,
                   r.revenue_acceleration, r.ebitda_acceleration,
                   r.capex_trend, r.working_capital_trend_2y, r.calculated_at
            FROM stock_ratios r
            JOIN stocks s ON s.id = r.stock_id
            WHERE r.stock_id = ?
            "#,
        )
        .bind(stock_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(DerivedRatios::from))
    }

    async fn save_derived_ratios(&self, ratios: &DerivedRatios) -> Result<DerivedRatios> {
        let calculated_at = ratios.calculated_at.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            INSERT INTO stock_ratios (
                stock_id,
                revenue_growth_1y, ebitda_growth_1y, equity_growth, debt_trend,
                cash_trend, working_capital_trend, leverage_change, debt_to_equity_2025,
                revenue_cagr_2y, ebitda_cagr_2y, book_value_cagr_2y,
                revenue_volatility, ebitda_volatility,
                revenue_acceleration, ebitda_acceleration,
                capex_trend, working_capital_trend_2y, calculated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_id) DO UPDATE SET
                revenue_growth_1y = excluded.revenue_growth_1y,
                ebitda_growth_1y = excluded.ebitda_growth_1y,
                equity_growth = excluded.equity_growth,
                debt_trend = excluded.debt_trend,
                cash_trend = excluded.cash_trend,
                working_capital_trend = excluded.working_capital_trend,
                leverage_change = excluded.leverage_change,
                debt_to_equity_2025 = excluded.debt_to_equity_2025,
                revenue_cagr_2y = excluded.revenue_cagr_2y,
                ebitda_cagr_2y = excluded.ebitda_cagr_2y,
                book_value_cagr_2y = excluded.book_value_cagr_2y,
                revenue_volatility = excluded.revenue_volatility,
                ebitda_volatility = excluded.ebitda_volatility,
                revenue_acceleration = excluded.revenue_acceleration,
                ebitda_acceleration = excluded.ebitda_acceleration,
                capex_trend = excluded.capex_trend,
                working_capital_trend_2y = excluded.working_capital_trend_2y,
                calculated_at = excluded.calculated_at
            "#,
        )
        .bind(ratios.stock_id)
        .bind(ratios.revenue_growth_1y)
        .bind(ratios.ebitda_growth_1y)
        .bind(ratios.equity_growth)
        .bind(ratios.debt_trend)
        .bind(ratios.cash_trend)
        .bind(ratios.working_capital_trend)
        .bind(ratios.leverage_change)
        .bind(ratios.debt_to_equity_2025)
        .bind(ratios.revenue_cagr_2y)
        .bind(ratios.ebitda_cagr_2y)
        .bind(ratios.book_value_cagr_2y)
        .bind(ratios.revenue_volatility)
        .bind(ratios.ebitda_volatility)
        .bind(ratios.revenue_acceleration)
        .bind(ratios.ebitda_acceleration)
        .bind(ratios.capex_trend)
        .bind(ratios.working_capital_trend_2y)
        .bind(calculated_at)
        .execute(self.db.pool())
        .await?;

        self.get_derived_ratios(ratios.stock_id)
            .await?
            .ok_or_else(|| anyhow!("Ratios for stock {} vanished after save", ratios.stock_id))
    }
}

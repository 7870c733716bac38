use anyhow::Result;
use async_trait::async_trait;
use prediction_core::{
    NewPrediction, PredictionRecord, PredictionRepository, PredictionSummary,
};

use crate::db::PredictionDb;
use crate::rows::PredictionRow;

pub struct SqlitePredictionRepository {
    db: PredictionDb,
}

impl SqlitePredictionRepository {
    pub fn new(db: PredictionDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PredictionRepository for SqlitePredictionRepository {
    async fn save_prediction(&self, prediction: &NewPrediction) -> Result<PredictionRecord> {
        let p = prediction;
        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO predictions (
                user_id, stock_id, ticker, company_name, sector,
                model1_prediction, model1_confidence, model1_reason, model1_top_features,
                model2_prediction, model2_confidence, model2_reason, model2_top_features,
                model3_prediction, model3_confidence, model3_reason, model3_top_features,
                final_recommendation, final_confidence, final_reasoning, overall_top_features,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&p.user_id)
        .bind(p.stock.id)
        .bind(&p.stock.ticker)
        .bind(&p.stock.company_name)
        .bind(&p.stock.sector)
        .bind(&p.valuation.label)
        .bind(p.valuation.confidence)
        .bind(&p.valuation.reason)
        .bind(serde_json::to_string(&p.valuation.top_features)?)
        .bind(&p.health.label)
        .bind(p.health.confidence)
        .bind(&p.health.reason)
        .bind(serde_json::to_string(&p.health.top_features)?)
        .bind(&p.growth.label)
        .bind(p.growth.confidence)
        .bind(&p.growth.reason)
        .bind(serde_json::to_string(&p.growth.top_features)?)
        .bind(p.ensemble.recommendation.as_str())
        .bind(p.ensemble.confidence)
        .bind(&p.ensemble.reasoning)
        .bind(serde_json::to_string(&p.ensemble.top_features)?)
        .bind(p.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PredictionRecord::from_new(
            result.last_insert_rowid(),
            prediction.clone(),
        ))
    }

    async fn get_prediction(&self, id: i64) -> Result<Option<PredictionRecord>> {
        let row = sqlx::query_as::<_, PredictionRow>("SELECT * FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(PredictionRecord::try_from).transpose()
    }

    async fn user_predictions(
        &self,
        user_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<PredictionSummary>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT * FROM predictions
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(|row| PredictionRecord::try_from(row).map(|record| record.summary()))
            .collect()
    }

    async fn count_user_predictions(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM predictions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count)
    }
}

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::currency::{RateDate, RateRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for quotations.
///
/// `save_rates` is all or nothing: either every record of the batch is
/// stored or none is.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn save_rates(&self, rates: &[RateRecord]) -> Result<(), StoreError>;

    async fn rates_by_date(&self, date: RateDate) -> Result<Vec<RateRecord>, StoreError>;

    async fn rates_by_date_and_code(
        &self,
        date: RateDate,
        code: &str,
    ) -> Result<Vec<RateRecord>, StoreError>;
}

/// Postgres backed store over the `r_currency` table.
#[derive(Clone)]
pub struct CurrencyOperation {
    db: PgPool,
}

impl CurrencyOperation {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateStore for CurrencyOperation {
    async fn save_rates(&self, rates: &[RateRecord]) -> Result<(), StoreError> {
        tracing::debug!("Saving {} rates", rates.len());

        let mut tx = self.db.begin().await?;

        for rate in rates {
            let inserted = sqlx::query(
                r#"
                INSERT INTO r_currency (title, code, value, a_date)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&rate.title)
            .bind(&rate.code)
            .bind(&rate.value)
            .bind(rate.date)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                tracing::error!("Failed to insert rate {} for {}: {}", rate.code, rate.date, e);
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!("Failed to roll back rates transaction: {}", rollback);
                }
                return Err(e.into());
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn rates_by_date(&self, date: RateDate) -> Result<Vec<RateRecord>, StoreError> {
        tracing::debug!("Getting rates for {}", date);

        let rates = sqlx::query_as::<_, RateRecord>(
            r#"
            SELECT title, code, value, a_date AS date
            FROM r_currency
            WHERE a_date = $1
            ORDER BY code, id
            "#,
        )
        .bind(date)
        .fetch_all(&self.db)
        .await?;

        Ok(rates)
    }

    async fn rates_by_date_and_code(
        &self,
        date: RateDate,
        code: &str,
    ) -> Result<Vec<RateRecord>, StoreError> {
        tracing::debug!("Getting rates for {} with code {}", date, code);

        let rates = sqlx::query_as::<_, RateRecord>(
            r#"
            SELECT title, code, value, a_date AS date
            FROM r_currency
            WHERE a_date = $1 AND code = $2
            ORDER BY id
            "#,
        )
        .bind(date)
        .bind(code)
        .fetch_all(&self.db)
        .await?;

        Ok(rates)
    }
}

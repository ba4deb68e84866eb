//! Currency use cases shared by the HTTP handlers and the save workers.

use std::sync::Arc;

use crate::database::{RateDate, RateRecord, RateStore, StoreError};
use crate::feed::{FeedDocument, FeedError, FeedSource};
use crate::worker::SaveJob;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Fetch(#[from] FeedError),
    #[error("failed to decode rates feed: {0}")]
    Decode(#[from] quick_xml::de::DeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CurrencyService {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn RateStore>,
}

impl CurrencyService {
    pub fn new(feed: Arc<dyn FeedSource>, store: Arc<dyn RateStore>) -> Self {
        Self { feed, store }
    }

    /// Fetches the feed for `date`, decodes it and stores every item in one
    /// transaction. Returns the number of stored records.
    pub async fn fetch_and_save_rates(&self, date: RateDate) -> Result<usize, ServiceError> {
        let body = self.feed.fetch(date).await.inspect_err(|e| {
            tracing::error!("Failed to fetch rates for {}: {}", date, e);
        })?;

        let document = FeedDocument::decode(&body).inspect_err(|e| {
            tracing::error!("Failed to decode rates feed for {}: {}", date, e);
        })?;

        if document.items.is_empty() {
            tracing::warn!("Rates feed for {} contains no items", date);
        }

        let rates: Vec<RateRecord> = document
            .items
            .iter()
            .map(|item| RateRecord::from_item(item, date))
            .collect();

        self.store.save_rates(&rates).await.inspect_err(|e| {
            tracing::error!("Failed to save {} rates for {}: {}", rates.len(), date, e);
        })?;

        Ok(rates.len())
    }

    /// Entry point for the save workers. Outcomes only surface in the logs.
    pub async fn run_save_job(&self, job: SaveJob) {
        match self.fetch_and_save_rates(job.date).await {
            Ok(saved) => tracing::info!(saved, "Saved rates for {}", job.date),
            Err(e) => tracing::error!(error = %e, "Failed to fetch and save rates for {}", job.date),
        }
    }

    pub async fn rates_by_date(&self, date: RateDate) -> Result<Vec<RateRecord>, ServiceError> {
        self.store.rates_by_date(date).await.map_err(|e| {
            tracing::error!("Failed to get rates by date {}: {}", date, e);
            e.into()
        })
    }

    pub async fn rates_by_date_and_code(
        &self,
        date: RateDate,
        code: &str,
    ) -> Result<Vec<RateRecord>, ServiceError> {
        self.store
            .rates_by_date_and_code(date, code)
            .await
            .map_err(|e| {
                tracing::error!("Failed to get rates by date {} and code {}: {}", date, code, e);
                e.into()
            })
    }
}

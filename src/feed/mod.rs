//! Upstream daily rates feed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::database::models::currency::RateDate;

/// One `<item>` of the feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedItem {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub title: String,
    /// The quoted rate.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quant: String,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub change: String,
}

/// The `<rates>` document returned by the feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedDocument {
    #[serde(default)]
    pub generator: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "item", default)]
    pub items: Vec<FeedItem>,
}

impl FeedDocument {
    pub fn decode(body: &str) -> Result<Self, quick_xml::de::DeError> {
        quick_xml::de::from_str(body)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// Source of raw feed bodies for a given date.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, date: RateDate) -> Result<String, FeedError>;
}

pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, date: RateDate) -> Result<String, FeedError> {
        let fdate = date.to_string();
        tracing::debug!("Fetching rates feed from {} for {}", self.url, fdate);

        let response = self
            .client
            .get(&self.url)
            .query(&[("fdate", fdate.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }

        Ok(response.text().await?)
    }
}

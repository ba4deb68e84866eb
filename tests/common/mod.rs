#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, response::Response};
use currency_rates::{
    AppState,
    config::LimiterConfig,
    database::{RateDate, RateRecord, RateStore, StoreError},
    feed::HttpFeedSource,
    limiter::RateLimiter,
    router::create_router,
    service::CurrencyService,
    worker::WorkerPool,
};
use serde_json::Value;
use tower::ServiceExt;

pub const FEED_PATH: &str = "/rss/get_rates.cfm";

pub const FEED_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rates>
    <generator>www.nationalbank.kz</generator>
    <title>Official exchange rates of National Bank of Republic Kazakhstan</title>
    <link>https://nationalbank.kz/</link>
    <description>Official exchange rates of National Bank of Republic Kazakhstan</description>
    <copyright>TOO "Nationalbank"</copyright>
    <date>01.01.2022</date>
    <item>
        <fullname>АВСТРАЛИЙСКИЙ ДОЛЛАР</fullname>
        <title>AUD</title>
        <description>313.67</description>
        <quant>1</quant>
        <index>DOWN</index>
        <change>-0.52</change>
    </item>
    <item>
        <fullname>ДОЛЛАР США</fullname>
        <title>USD</title>
        <description>431.67</description>
        <quant>1</quant>
        <index>UP</index>
        <change>+1.05</change>
    </item>
    <item>
        <fullname>ЕВРО</fullname>
        <title>EUR</title>
        <description>489.10</description>
        <quant>1</quant>
        <index>UP</index>
        <change>+0.80</change>
    </item>
</rates>"#;

/// In-memory store with the same all-or-nothing batch semantics as Postgres.
#[derive(Default)]
pub struct MemoryRateStore {
    rows: Mutex<Vec<RateRecord>>,
    fail_insert_of: Mutex<Option<String>>,
    fail_reads: Mutex<bool>,
}

impl MemoryRateStore {
    pub fn fail_insert_of(&self, code: &str) {
        *self.fail_insert_of.lock().unwrap() = Some(code.to_owned());
    }

    pub fn fail_reads(&self) {
        *self.fail_reads.lock().unwrap() = true;
    }

    pub fn insert(&self, record: RateRecord) {
        self.rows.lock().unwrap().push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn read_error(&self) -> Option<StoreError> {
        (*self.fail_reads.lock().unwrap()).then(|| {
            StoreError::Database(sqlx::Error::Protocol("connection reset by peer".into()))
        })
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn save_rates(&self, rates: &[RateRecord]) -> Result<(), StoreError> {
        let failing = self.fail_insert_of.lock().unwrap().clone();
        let mut staged = Vec::with_capacity(rates.len());
        for rate in rates {
            if failing.as_deref() == Some(rate.code.as_str()) {
                return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "insert of {} failed",
                    rate.code
                ))));
            }
            staged.push(rate.clone());
        }
        self.rows.lock().unwrap().extend(staged);
        Ok(())
    }

    async fn rates_by_date(&self, date: RateDate) -> Result<Vec<RateRecord>, StoreError> {
        if let Some(e) = self.read_error() {
            return Err(e);
        }
        let mut rates: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect();
        rates.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rates)
    }

    async fn rates_by_date_and_code(
        &self,
        date: RateDate,
        code: &str,
    ) -> Result<Vec<RateRecord>, StoreError> {
        let rates = self.rates_by_date(date).await?;
        Ok(rates.into_iter().filter(|r| r.code == code).collect())
    }
}

pub fn date(raw: &str) -> RateDate {
    raw.parse().unwrap()
}

pub fn service(feed_url: &str, store: Arc<MemoryRateStore>, timeout: Duration) -> CurrencyService {
    let feed = HttpFeedSource::new(format!("{feed_url}{FEED_PATH}"), timeout).unwrap();
    CurrencyService::new(Arc::new(feed), store)
}

pub struct TestApp {
    pub router: Router,
    pub workers: WorkerPool,
    pub store: Arc<MemoryRateStore>,
}

pub fn limiter_config(rps: f64, burst: u32) -> LimiterConfig {
    LimiterConfig {
        enabled: true,
        rps,
        burst,
        ..LimiterConfig::default()
    }
}

pub fn spawn_app(feed_url: &str, limiter: LimiterConfig) -> TestApp {
    let store = Arc::new(MemoryRateStore::default());
    let service = service(feed_url, Arc::clone(&store), Duration::from_secs(5));

    let job_service = service.clone();
    let (queue, workers) = WorkerPool::start(2, 16, move |job| {
        let service = job_service.clone();
        async move { service.run_save_job(job).await }
    });

    let limiter = Arc::new(RateLimiter::new(&limiter).unwrap());
    let router = create_router(AppState { service, queue }, limiter);

    TestApp {
        router,
        workers,
        store,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Response {
        self.get_from(uri, "203.0.113.10").await
    }

    pub async fn get_from(&self, uri: &str, client: &str) -> Response {
        let request = Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Polls until the store holds `rows` records or the deadline passes.
    pub async fn wait_for_rows(&self, rows: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.store.len() < rows {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {rows} rows, have {}",
                self.store.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

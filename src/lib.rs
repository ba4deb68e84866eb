use service::CurrencyService;
use worker::SaveQueue;

pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod limiter;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod service;
pub mod worker;

#[derive(Clone)]
pub struct AppState {
    pub service: CurrencyService,
    pub queue: SaveQueue,
}

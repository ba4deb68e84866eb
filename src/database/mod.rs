// Storage layer: persisted models and their Postgres operations.

pub mod models;
pub mod operations;

pub use models::currency::{RateDate, RateDateError, RateRecord};
pub use operations::currency::{CurrencyOperation, RateStore, StoreError};

use serde::Serialize;

use crate::database::{RateDate, RateRecord, models::currency::is_currency_code};
use crate::error::AppError;

pub const DATE_REQUIRED: &str = "date is required. Example: '01-01-2022'";

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct RatesResponse {
    pub rates: Vec<RateRecord>,
}

pub fn parse_date(raw: &str) -> Result<RateDate, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest(DATE_REQUIRED.to_string()));
    }

    raw.parse().map_err(|e| {
        tracing::debug!("Rejected date {:?}: {}", raw, e);
        AppError::BadRequest(format!("invalid date '{raw}': {e}. Example: '01-01-2022'"))
    })
}

pub fn parse_code(raw: &str) -> Result<&str, AppError> {
    if is_currency_code(raw) {
        Ok(raw)
    } else {
        Err(AppError::BadRequest(format!(
            "invalid code '{raw}': expected three uppercase letters. Example: 'USD'"
        )))
    }
}

mod handler;
mod model;

pub use handler::{get_rates, get_rates_by_code, save_rates, save_rates_without_date};
pub use model::{DATE_REQUIRED, RatesResponse, SaveResponse};

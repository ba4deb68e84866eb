mod access_log;
mod rate_limit;
mod request_id;

pub use access_log::access_log;
pub use rate_limit::{UNKNOWN_CLIENT, client_ip, rate_limit};
pub use request_id::{REQUEST_ID_HEADER, RequestId, assign_request_id};

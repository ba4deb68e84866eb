use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::feed::FeedItem;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[.-](\d{1,2})[.-](\d{4})$").expect("date pattern is valid")
});

/// Calendar date of a quotation.
///
/// Accepts `D.M.YYYY` and `D-M-YYYY` (one or two digit day and month) and
/// always renders as `DD.MM.YYYY`, which is also the format the feed expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct RateDate(NaiveDate);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateDateError {
    #[error("date must look like DD.MM.YYYY or DD-MM-YYYY")]
    Format,
    #[error("{0} is not a calendar date")]
    OutOfRange(String),
}

impl FromStr for RateDate {
    type Err = RateDateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let caps = DATE_PATTERN.captures(raw).ok_or(RateDateError::Format)?;
        let field = |i: usize| caps[i].parse::<u32>().map_err(|_| RateDateError::Format);
        let (day, month) = (field(1)?, field(2)?);
        let year = caps[3].parse::<i32>().map_err(|_| RateDateError::Format)?;

        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| RateDateError::OutOfRange(raw.to_owned()))
    }
}

impl fmt::Display for RateDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%d.%m.%Y"))
    }
}

impl Serialize for RateDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Currency codes are exactly three ASCII uppercase letters.
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// A stored quotation. `value` is kept as text so no rounding ever happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RateRecord {
    pub title: String,
    pub code: String,
    pub value: String,
    pub date: RateDate,
}

impl RateRecord {
    pub fn from_item(item: &FeedItem, date: RateDate) -> Self {
        Self {
            title: item.fullname.clone(),
            code: item.title.clone(),
            value: item.description.clone(),
            date,
        }
    }
}

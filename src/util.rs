use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

const TRADING_CENTRAL_TOKEN: &str = "TRADING_CENTRAL_TOKEN";

pub fn get_trading_central_token() -> Option<String> {
    let token_from_env = std::env::var(TRADING_CENTRAL_TOKEN);
    token_from_env.ok().filter(|t| !t.is_empty())
}

static TICKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{1,10}$").expect("ticker pattern is valid"));

/// Trim and uppercase a ticker symbol.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// 1-10 uppercase alphanumerics, checked after normalization.
pub fn is_valid_ticker(ticker: &str) -> bool {
    TICKER_PATTERN.is_match(&normalize_ticker(ticker))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `now` minus `hours`, or `None` when the offset leaves chrono's range.
pub fn hours_before(now: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_hours(hours).and_then(|delta| now.checked_sub_signed(delta))
}

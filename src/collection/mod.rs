//! Collection of metric families per ticker, with one audit row per attempt.

pub mod audit;
pub mod orchestrator;
pub mod summary;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::MetricFamily;
use crate::fetch::FetchError;
use crate::parse::ParseError;
use crate::storage::StorageError;

pub use audit::CollectionAudit;
pub use orchestrator::CollectionOrchestrator;
pub use summary::{CollectionSummary, Overview};

/// Recorded when a fetch yields nothing usable.
pub const NO_DATA_MESSAGE: &str = "no data received from API";
pub const MISSING_V4_ID_MESSAGE: &str = "No Trading Central ID configured";
pub const MISSING_V3_ID_MESSAGE: &str = "No Trading Central V3 ID configured";

#[derive(Debug)]
pub enum CollectError {
    /// Missing instrument id or credential
    Configuration(String),

    /// The fetch failed; the cause is logged, not surfaced
    NoData(FetchError),

    Parse(ParseError),

    Persistence(StorageError),

    MissingParser(MetricFamily),

    /// The collection operation panicked
    Panicked(String),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Configuration(msg) => write!(f, "{msg}"),
            CollectError::NoData(_) => write!(f, "{NO_DATA_MESSAGE}"),
            CollectError::Parse(err) => write!(f, "failed to parse payload: {err}"),
            CollectError::Persistence(err) => write!(f, "failed to persist snapshot: {err}"),
            CollectError::MissingParser(family) => write!(f, "no parser registered for {family}"),
            CollectError::Panicked(msg) => write!(f, "collection panicked: {msg}"),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<FetchError> for CollectError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Configuration(msg) => CollectError::Configuration(msg),
            other => CollectError::NoData(other),
        }
    }
}

impl From<ParseError> for CollectError {
    fn from(err: ParseError) -> Self {
        CollectError::Parse(err)
    }
}

impl From<StorageError> for CollectError {
    fn from(err: StorageError) -> Self {
        CollectError::Persistence(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Success,
    Error,
}

/// Outcome of collecting one family for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyResult {
    pub status: CollectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub records: usize,
}

impl FamilyResult {
    pub fn success(records: usize) -> Self {
        Self {
            status: CollectionStatus::Success,
            message: None,
            records,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CollectionStatus::Error,
            message: Some(message.into()),
            records: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CollectionStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerOutcome {
    FullySuccessful,
    PartiallySuccessful,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickerSummary {
    pub total_families: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_records: usize,
    pub duration_seconds: f64,
}

impl TickerSummary {
    pub fn outcome(&self) -> TickerOutcome {
        if self.successful == 0 {
            TickerOutcome::Failed
        } else if self.failed == 0 {
            TickerOutcome::FullySuccessful
        } else {
            TickerOutcome::PartiallySuccessful
        }
    }
}

/// Per-family results for one ticker, in collection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerCollection {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub families: BTreeMap<MetricFamily, FamilyResult>,
    pub summary: TickerSummary,
}

impl TickerCollection {
    pub fn outcome(&self) -> TickerOutcome {
        if self.error.is_some() {
            return TickerOutcome::Failed;
        }
        self.summary.outcome()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSummary {
    pub total_tickers: usize,
    pub fully_successful: usize,
    pub partially_successful: usize,
    pub failed: usize,
    pub total_records: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetCollection {
    pub timestamp: DateTime<Utc>,
    pub tickers: Vec<TickerCollection>,
    pub summary: FleetSummary,
}

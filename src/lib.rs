pub mod actors;
pub mod alerts;
pub mod collection;
pub mod compare;
pub mod config;
pub mod fetch;
pub mod parse;
pub mod storage;
pub mod util;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::provider::Endpoint;
use crate::parse::classify::{Rating, Sentiment};

/// One category of collected data for a ticker.
///
/// The declaration order is the fixed collection order used by the
/// orchestrator, so `Ord` follows it as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    AnalystRatings,
    NewsSentiment,
    QuantamentalScores,
    HedgeFundData,
    CrowdStatistics,
    BloggerSentiment,
    TechnicalIndicators,
    TargetPrices,
}

impl MetricFamily {
    /// All families in collection order.
    pub const ALL: [MetricFamily; 8] = [
        MetricFamily::AnalystRatings,
        MetricFamily::NewsSentiment,
        MetricFamily::QuantamentalScores,
        MetricFamily::HedgeFundData,
        MetricFamily::CrowdStatistics,
        MetricFamily::BloggerSentiment,
        MetricFamily::TechnicalIndicators,
        MetricFamily::TargetPrices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFamily::AnalystRatings => "analyst_ratings",
            MetricFamily::NewsSentiment => "news_sentiment",
            MetricFamily::QuantamentalScores => "quantamental_scores",
            MetricFamily::HedgeFundData => "hedge_fund_data",
            MetricFamily::CrowdStatistics => "crowd_statistics",
            MetricFamily::BloggerSentiment => "blogger_sentiment",
            MetricFamily::TechnicalIndicators => "technical_indicators",
            MetricFamily::TargetPrices => "target_prices",
        }
    }

    /// Upstream endpoint the family is collected from.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            MetricFamily::AnalystRatings => Endpoint::ANALYST_RATINGS,
            MetricFamily::NewsSentiment => Endpoint::NEWS,
            MetricFamily::QuantamentalScores => Endpoint::QUANTAMENTAL,
            MetricFamily::HedgeFundData => Endpoint::ETORO_DATA,
            MetricFamily::CrowdStatistics => Endpoint::CROWD_DATA,
            MetricFamily::BloggerSentiment => Endpoint::BLOGGERS,
            MetricFamily::TechnicalIndicators => Endpoint::TECHNICAL_SUMMARIES,
            MetricFamily::TargetPrices => Endpoint::TARGET_PRICES,
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        MetricFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == wanted)
            .ok_or_else(|| format!("unknown metric family: {s}"))
    }
}

/// A single normalized field value extracted from a provider payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Rating(Rating),
    Sentiment(Sentiment),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_rating(&self) -> Option<Rating> {
        match self {
            FieldValue::Rating(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_sentiment(&self) -> Option<Sentiment> {
        match self {
            FieldValue::Sentiment(s) => Some(*s),
            _ => None,
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// One timestamped observation of a metric family for one ticker.
///
/// Snapshots are append-only: once committed to a storage backend they are
/// never mutated, and timestamps within a `(ticker, family)` stream never
/// decrease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ticker: String,
    pub family: MetricFamily,
    pub timestamp: DateTime<Utc>,
    pub fields: FieldMap,
    pub raw_payload: serde_json::Value,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(
        ticker: impl Into<String>,
        family: MetricFamily,
        fields: FieldMap,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self::at(ticker, family, Utc::now(), fields, raw_payload)
    }

    pub fn at(
        ticker: impl Into<String>,
        family: MetricFamily,
        timestamp: DateTime<Utc>,
        fields: FieldMap,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            family,
            timestamp,
            fields,
            raw_payload,
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(FieldValue::as_number)
    }

    pub fn rating(&self, field: &str) -> Option<Rating> {
        self.fields.get(field).and_then(FieldValue::as_rating)
    }

    pub fn sentiment(&self, field: &str) -> Option<Sentiment> {
        self.fields.get(field).and_then(FieldValue::as_sentiment)
    }
}

/// Audit row written once per collection attempt, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionLogEntry {
    pub ticker: String,
    pub family: MetricFamily,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_seconds: f64,
    pub records_collected: usize,
    pub source: String,
    pub endpoint: String,
}

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::storage::StorageBackend;
use crate::util::{hours_before, normalize_ticker, round_to};
use crate::{MetricFamily, Snapshot};

pub const PRICE_TARGET_THRESHOLD_PERCENT: f64 = 10.0;
pub const PRICE_TARGET_HIGH_PERCENT: f64 = 20.0;
pub const POSITION_CHURN_THRESHOLD: f64 = 5.0;
pub const POSITION_CHURN_HIGH: f64 = 10.0;
pub const TRENDING_RANK_THRESHOLD: f64 = 10.0;
pub const TRENDING_RANK_MEDIUM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    RatingChange,
    PriceTargetChange,
    SentimentShift,
    HedgeFundActivity,
    Trending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub ticker: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub data: serde_json::Value,
}

impl Alert {
    fn new(
        current: &Snapshot,
        alert_type: AlertType,
        severity: Severity,
        message: String,
        data: serde_json::Value,
    ) -> Self {
        Self {
            ticker: current.ticker.clone(),
            alert_type,
            severity,
            timestamp: current.timestamp,
            message,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertReport {
    pub timestamp: DateTime<Utc>,
    pub hours_ago: i64,
    pub total_alerts: usize,
    pub alerts: Vec<Alert>,
}

fn label<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Consensus rating differs between the two snapshots.
pub fn rating_change(current: &Snapshot, previous: &Snapshot) -> Option<Alert> {
    let now = current.rating("consensus_rating");
    let before = previous.rating("consensus_rating");
    if now == before {
        return None;
    }

    Some(Alert::new(
        current,
        AlertType::RatingChange,
        Severity::High,
        format!(
            "Analyst consensus changed from {} to {}",
            label(before),
            label(now)
        ),
        json!({"previous": before, "current": now}),
    ))
}

/// Average price target moved by at least 10%.
pub fn price_target_change(current: &Snapshot, previous: &Snapshot) -> Option<Alert> {
    let now = current.number("avg_price_target")?;
    let before = previous.number("avg_price_target").filter(|v| *v > 0.0)?;

    let pct = (now - before) / before * 100.0;
    if pct.abs() < PRICE_TARGET_THRESHOLD_PERCENT {
        return None;
    }
    let severity = if pct.abs() < PRICE_TARGET_HIGH_PERCENT {
        Severity::Medium
    } else {
        Severity::High
    };

    Some(Alert::new(
        current,
        AlertType::PriceTargetChange,
        severity,
        format!("Price target changed by {pct:.1}%"),
        json!({
            "previous": before,
            "current": now,
            "percentage_change": round_to(pct, 2),
        }),
    ))
}

/// News sentiment category differs; a direct bullish/bearish flip is high.
pub fn sentiment_shift(current: &Snapshot, previous: &Snapshot) -> Option<Alert> {
    let now = current.sentiment("sentiment");
    let before = previous.sentiment("sentiment");
    if now == before {
        return None;
    }

    let flipped = matches!((now, before), (Some(a), Some(b)) if a.is_opposite(&b));
    let severity = if flipped {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(Alert::new(
        current,
        AlertType::SentimentShift,
        severity,
        format!(
            "News sentiment shifted from {} to {}",
            label(before),
            label(now)
        ),
        json!({"previous": before, "current": now}),
    ))
}

/// Significant accumulation or distribution by institutional holders.
pub fn hedge_fund_activity(current: &Snapshot) -> Option<Alert> {
    let count = |field: &str| current.number(field).unwrap_or(0.0);
    let accumulation = count("new_positions") + count("increased_positions");
    let distribution = count("decreased_positions") + count("closed_positions");

    if accumulation < POSITION_CHURN_THRESHOLD && distribution < POSITION_CHURN_THRESHOLD {
        return None;
    }
    let severity = if accumulation >= POSITION_CHURN_HIGH || distribution >= POSITION_CHURN_HIGH {
        Severity::High
    } else {
        Severity::Medium
    };
    let activity = if accumulation > distribution {
        "accumulation"
    } else {
        "distribution"
    };

    Some(Alert::new(
        current,
        AlertType::HedgeFundActivity,
        severity,
        format!("Significant hedge fund {activity} detected"),
        json!({
            "new_positions": current.number("new_positions"),
            "increased_positions": current.number("increased_positions"),
            "decreased_positions": current.number("decreased_positions"),
            "closed_positions": current.number("closed_positions"),
        }),
    ))
}

/// Daily crowd rank within the top ten.
pub fn trending(current: &Snapshot) -> Option<Alert> {
    let rank = current
        .number("rank_day")
        .filter(|rank| *rank > 0.0 && *rank <= TRENDING_RANK_THRESHOLD)?;
    let severity = if rank > TRENDING_RANK_MEDIUM {
        Severity::Low
    } else {
        Severity::Medium
    };

    Some(Alert::new(
        current,
        AlertType::Trending,
        severity,
        format!("Trending: #{rank} in daily crowd rankings"),
        json!({
            "rank_day": rank,
            "rank_week": current.number("rank_week"),
            "mentions_count": current.number("mentions_count"),
        }),
    ))
}

/// Severity descending, then newest first.
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by_key(|alert| (Reverse(alert.severity), Reverse(alert.timestamp)));
}

#[derive(Clone)]
pub struct AlertEngine {
    store: Arc<dyn StorageBackend>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    pub async fn scan(
        &self,
        tickers: &[String],
        lookback_hours: i64,
        severity: Option<Severity>,
    ) -> AlertReport {
        self.scan_at(Utc::now(), tickers, lookback_hours, severity)
            .await
    }

    /// Evaluate every rule for every ticker.
    ///
    /// The severity filter keeps only alerts of exactly that severity and is
    /// applied after sorting. A lookback reaching past the representable
    /// range leaves the change rules without a previous snapshot.
    #[instrument(skip(self, tickers), fields(tickers = tickers.len()))]
    pub async fn scan_at(
        &self,
        now: DateTime<Utc>,
        tickers: &[String],
        lookback_hours: i64,
        severity: Option<Severity>,
    ) -> AlertReport {
        let cutoff = hours_before(now, lookback_hours).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut alerts = Vec::new();
        for ticker in tickers {
            alerts.extend(self.ticker_alerts(&normalize_ticker(ticker), cutoff).await);
        }

        sort_alerts(&mut alerts);
        if let Some(severity) = severity {
            alerts.retain(|alert| alert.severity == severity);
        }
        debug!("alert scan produced {} alerts", alerts.len());

        AlertReport {
            timestamp: now,
            hours_ago: lookback_hours,
            total_alerts: alerts.len(),
            alerts,
        }
    }

    async fn ticker_alerts(&self, ticker: &str, cutoff: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if let (Some(current), Some(previous)) =
            self.pair(ticker, MetricFamily::AnalystRatings, cutoff).await
        {
            alerts.extend(rating_change(&current, &previous));
            alerts.extend(price_target_change(&current, &previous));
        }

        if let (Some(current), Some(previous)) =
            self.pair(ticker, MetricFamily::NewsSentiment, cutoff).await
        {
            alerts.extend(sentiment_shift(&current, &previous));
        }

        if let (Some(current), Some(_)) =
            self.pair(ticker, MetricFamily::HedgeFundData, cutoff).await
        {
            alerts.extend(hedge_fund_activity(&current));
        }

        if let Some(current) = self.latest(ticker, MetricFamily::CrowdStatistics).await {
            alerts.extend(trending(&current));
        }

        alerts
    }

    async fn latest(&self, ticker: &str, family: MetricFamily) -> Option<Snapshot> {
        match self.store.query_latest(ticker, family).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("failed to load latest {family} for {ticker}: {err}");
                None
            }
        }
    }

    async fn pair(
        &self,
        ticker: &str,
        family: MetricFamily,
        cutoff: DateTime<Utc>,
    ) -> (Option<Snapshot>, Option<Snapshot>) {
        let Some(current) = self.latest(ticker, family).await else {
            return (None, None);
        };

        match self.store.query_as_of(ticker, family, cutoff).await {
            Ok(previous) => (Some(current), previous),
            Err(err) => {
                warn!("failed to load {family} as of {cutoff} for {ticker}: {err}");
                (Some(current), None)
            }
        }
    }
}

//! Historical comparison of numeric metrics.
//!
//! A comparison looks up the latest snapshot of a stream and the latest
//! snapshot at or before `now - period`, then computes per-metric changes
//! and trend labels.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{StorageBackend, StorageError};
use crate::util::{hours_before, normalize_ticker, round_to};
use crate::{MetricFamily, Snapshot};

/// Percent change beyond which a metric is trending.
pub const TREND_THRESHOLD_PERCENT: f64 = 1.0;

pub const DEFAULT_PERIODS: [&str; 4] = ["1h", "1d", "1w", "1M"];

#[derive(Debug)]
pub enum ComparisonError {
    InvalidPeriod(String),
    NoData { ticker: String, family: MetricFamily },
    Storage(StorageError),
}

impl fmt::Display for ComparisonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonError::InvalidPeriod(period) => write!(f, "invalid period: {period:?}"),
            ComparisonError::NoData { ticker, family } => {
                write!(f, "no {family} data for {ticker}")
            }
            ComparisonError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ComparisonError {}

impl From<StorageError> for ComparisonError {
    fn from(err: StorageError) -> Self {
        ComparisonError::Storage(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub old_value: Option<f64>,
    pub new_value: Option<f64>,
    pub absolute_change: Option<f64>,
    pub percentage_change: Option<f64>,
    pub trend: Trend,
}

/// Change from `old` to `new`.
///
/// The absolute change is rounded to 4 decimals, the percentage to 2 and is
/// absent when `old` is zero. When either side is missing the trend is
/// unknown.
pub fn change(old: Option<f64>, new: Option<f64>) -> Change {
    let (Some(old_value), Some(new_value)) = (old, new) else {
        return Change {
            old_value: old,
            new_value: new,
            absolute_change: None,
            percentage_change: None,
            trend: Trend::Unknown,
        };
    };

    let absolute = new_value - old_value;
    let percentage = (old_value != 0.0).then(|| absolute / old_value.abs() * 100.0);

    let trend = match percentage {
        Some(pct) if pct > TREND_THRESHOLD_PERCENT => Trend::Up,
        Some(pct) if pct < -TREND_THRESHOLD_PERCENT => Trend::Down,
        Some(_) => Trend::Stable,
        None if new_value > 0.0 => Trend::Up,
        None if new_value < 0.0 => Trend::Down,
        None => Trend::Stable,
    };

    Change {
        old_value: Some(old_value),
        new_value: Some(new_value),
        absolute_change: Some(round_to(absolute, 4)),
        percentage_change: percentage.map(|p| round_to(p, 2)),
        trend,
    }
}

static PERIOD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([hdwmM]?)$").expect("period pattern is valid"));

/// Convert a period label into hours.
///
/// `h` hours, `d` days, `w` weeks, `m`/`M` 30-day months; a bare number is
/// hours.
pub fn parse_period(period: &str) -> Result<i64, ComparisonError> {
    let invalid = || ComparisonError::InvalidPeriod(period.to_string());
    let captures = PERIOD_PATTERN.captures(period.trim()).ok_or_else(invalid)?;

    let amount: i64 = captures[1].parse().map_err(|_| invalid())?;
    let multiplier = match &captures[2] {
        "" | "h" => 1,
        "d" => 24,
        "w" => 24 * 7,
        _ => 24 * 30,
    };

    amount.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parse `period` and resolve it to an as-of cutoff before `now`.
///
/// A period reaching outside chrono's representable range is invalid.
fn period_cutoff(
    now: DateTime<Utc>,
    period: &str,
) -> Result<(i64, DateTime<Utc>), ComparisonError> {
    let hours = parse_period(period)?;
    let cutoff = hours_before(now, hours)
        .ok_or_else(|| ComparisonError::InvalidPeriod(period.to_string()))?;
    Ok((hours, cutoff))
}

/// Numeric fields compared for each family.
pub fn tracked_metrics(family: MetricFamily) -> &'static [&'static str] {
    match family {
        MetricFamily::AnalystRatings => &[
            "total_analysts",
            "buy_count",
            "hold_count",
            "sell_count",
            "consensus_score",
            "avg_price_target",
            "high_price_target",
            "low_price_target",
        ],
        MetricFamily::NewsSentiment => &[
            "sentiment_score",
            "stock_bullish_percent",
            "stock_bearish_percent",
            "buzz_score",
            "total_articles",
        ],
        MetricFamily::QuantamentalScores => &[
            "overall_score",
            "quality_score",
            "value_score",
            "growth_score",
            "momentum_score",
            "income_score",
        ],
        MetricFamily::HedgeFundData => &[
            "sentiment_score",
            "trend_value",
            "new_positions",
            "increased_positions",
            "decreased_positions",
            "closed_positions",
        ],
        MetricFamily::CrowdStatistics => &[
            "sentiment_score",
            "portfolio_holding",
            "percent_allocated",
            "percent_over_last_7d",
            "percent_over_last_30d",
            "mentions_count",
        ],
        MetricFamily::BloggerSentiment => &[
            "sentiment_score",
            "bullish_percent",
            "bearish_percent",
            "total_articles",
        ],
        MetricFamily::TechnicalIndicators => &["short_score", "intermediate_score", "long_score"],
        MetricFamily::TargetPrices => &["target_price", "close_price", "upside_potential"],
    }
}

fn metric_changes(
    family: MetricFamily,
    current: &Snapshot,
    previous: Option<&Snapshot>,
) -> BTreeMap<String, Change> {
    tracked_metrics(family)
        .iter()
        .map(|metric| {
            let old = previous.and_then(|s| s.number(metric));
            (metric.to_string(), change(old, current.number(metric)))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodResult {
    pub period: String,
    pub hours_ago: i64,
    pub data_timestamp: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<String, Change>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub ticker: String,
    pub family: MetricFamily,
    pub current_timestamp: DateTime<Utc>,
    pub periods: Vec<PeriodResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerTrend {
    pub ticker: String,
    pub current_timestamp: DateTime<Utc>,
    pub period_timestamp: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<String, Change>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerComparison {
    pub family: MetricFamily,
    pub period: String,
    pub hours_ago: i64,
    /// Tickers without any current data are omitted
    pub tickers: Vec<TickerTrend>,
}

impl TickerComparison {
    /// Tickers ordered by percentage change of `metric`, largest first.
    /// Tickers without a percentage for the metric are left out.
    pub fn rank_by(&self, metric: &str) -> Vec<(String, f64)> {
        let mut ranked: Vec<_> = self
            .tickers
            .iter()
            .filter_map(|t| {
                let pct = t.metrics.get(metric)?.percentage_change?;
                Some((t.ticker.clone(), pct))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllComparisons {
    pub ticker: String,
    pub families: BTreeMap<MetricFamily, PeriodComparison>,
}

#[derive(Clone)]
pub struct ComparisonEngine {
    store: Arc<dyn StorageBackend>,
}

impl ComparisonEngine {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    pub async fn compare_periods(
        &self,
        ticker: &str,
        family: MetricFamily,
        periods: &[&str],
    ) -> Result<PeriodComparison, ComparisonError> {
        self.compare_periods_at(Utc::now(), ticker, family, periods)
            .await
    }

    /// Compare the latest snapshot against each period's as-of snapshot.
    ///
    /// A period without historical data yields unknown trends.
    pub async fn compare_periods_at(
        &self,
        now: DateTime<Utc>,
        ticker: &str,
        family: MetricFamily,
        periods: &[&str],
    ) -> Result<PeriodComparison, ComparisonError> {
        let cutoffs = periods
            .iter()
            .map(|p| period_cutoff(now, p))
            .collect::<Result<Vec<_>, _>>()?;

        let ticker = normalize_ticker(ticker);
        let current = self
            .store
            .query_latest(&ticker, family)
            .await?
            .ok_or_else(|| ComparisonError::NoData {
                ticker: ticker.clone(),
                family,
            })?;

        let mut results = Vec::with_capacity(periods.len());
        for (period, (hours_ago, cutoff)) in periods.iter().zip(cutoffs) {
            let previous = self.store.query_as_of(&ticker, family, cutoff).await?;
            if previous.is_none() {
                debug!("no {family} data for {ticker} {hours_ago}h ago");
            }

            results.push(PeriodResult {
                period: period.to_string(),
                hours_ago,
                data_timestamp: previous.as_ref().map(|s| s.timestamp),
                metrics: metric_changes(family, &current, previous.as_ref()),
            });
        }

        Ok(PeriodComparison {
            ticker,
            family,
            current_timestamp: current.timestamp,
            periods: results,
        })
    }

    pub async fn compare_tickers(
        &self,
        tickers: &[String],
        family: MetricFamily,
        period: &str,
    ) -> Result<TickerComparison, ComparisonError> {
        self.compare_tickers_at(Utc::now(), tickers, family, period)
            .await
    }

    /// Cross-sectional comparison of one family over one period.
    pub async fn compare_tickers_at(
        &self,
        now: DateTime<Utc>,
        tickers: &[String],
        family: MetricFamily,
        period: &str,
    ) -> Result<TickerComparison, ComparisonError> {
        let (hours_ago, cutoff) = period_cutoff(now, period)?;

        let mut trends = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let ticker = normalize_ticker(ticker);
            let Some(current) = self.store.query_latest(&ticker, family).await? else {
                debug!("skipping {ticker}: no {family} data");
                continue;
            };
            let previous = self.store.query_as_of(&ticker, family, cutoff).await?;

            trends.push(TickerTrend {
                metrics: metric_changes(family, &current, previous.as_ref()),
                current_timestamp: current.timestamp,
                period_timestamp: previous.map(|s| s.timestamp),
                ticker,
            });
        }

        Ok(TickerComparison {
            family,
            period: period.to_string(),
            hours_ago,
            tickers: trends,
        })
    }

    /// Every family that has data for `ticker`.
    pub async fn compare_all(
        &self,
        ticker: &str,
        periods: &[&str],
    ) -> Result<AllComparisons, ComparisonError> {
        let mut families = BTreeMap::new();
        for family in MetricFamily::ALL {
            match self.compare_periods(ticker, family, periods).await {
                Ok(comparison) => {
                    families.insert(family, comparison);
                }
                Err(ComparisonError::NoData { .. }) => {}
                Err(ComparisonError::Storage(err)) => {
                    warn!("skipping {family} comparison for {ticker}: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(AllComparisons {
            ticker: normalize_ticker(ticker),
            families,
        })
    }
}

//! Aggregate statistics over recent collection log rows, and the
//! per-ticker overview of the newest stored snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::alerts::AlertEngine;
use crate::parse::classify::Sentiment;
use crate::storage::{StorageBackend, StorageResult};
use crate::util::{hours_before, normalize_ticker, round_to};
use crate::{CollectionLogEntry, MetricFamily, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestCollection {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub timestamp: DateTime<Utc>,
    pub hours_ago: i64,
    pub total_collections: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage, one decimal
    pub success_rate: f64,
    pub total_records_collected: usize,
    /// Newest successful attempt per family inside the window.
    pub latest_collections: BTreeMap<MetricFamily, LatestCollection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerOverview {
    pub ticker: String,
    /// Families without any stored snapshot are absent.
    pub latest: BTreeMap<MetricFamily, Snapshot>,
    pub alert_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    /// Mean news sentiment score, four decimals.
    pub avg_sentiment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub timestamp: DateTime<Utc>,
    pub total_tickers: usize,
    pub tickers: BTreeMap<String, TickerOverview>,
    pub summary: SentimentSummary,
}

pub fn summarize(
    logs: &[CollectionLogEntry],
    now: DateTime<Utc>,
    hours_ago: i64,
) -> CollectionSummary {
    let successful = logs.iter().filter(|entry| entry.success).count();
    let total = logs.len();
    let success_rate = if total == 0 {
        0.0
    } else {
        round_to(successful as f64 / total as f64 * 100.0, 1)
    };

    let mut latest_collections: BTreeMap<MetricFamily, LatestCollection> = BTreeMap::new();
    for entry in logs.iter().filter(|entry| entry.success) {
        let newer = latest_collections
            .get(&entry.family)
            .is_none_or(|latest| entry.timestamp >= latest.timestamp);
        if newer {
            latest_collections.insert(
                entry.family,
                LatestCollection {
                    timestamp: entry.timestamp,
                    success: entry.success,
                    records: entry.records_collected,
                },
            );
        }
    }

    CollectionSummary {
        timestamp: now,
        hours_ago,
        total_collections: total,
        successful,
        failed: total - successful,
        success_rate,
        total_records_collected: logs.iter().map(|e| e.records_collected).sum(),
        latest_collections,
    }
}

/// Summarize the log rows of the last `hours_ago` hours.
pub async fn collection_summary(
    store: &dyn StorageBackend,
    now: DateTime<Utc>,
    hours_ago: i64,
) -> StorageResult<CollectionSummary> {
    let since = hours_before(now, hours_ago).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let logs = store.query_logs_since(since).await?;
    Ok(summarize(&logs, now, hours_ago))
}

/// Latest snapshot of every family per ticker, with the number of alerts a
/// scan over `alert_hours` raises for it.
///
/// Tickers without news sentiment, or with an unknown label, count as
/// neutral.
#[instrument(skip(store, tickers), fields(tickers = tickers.len()))]
pub async fn overview(
    store: Arc<dyn StorageBackend>,
    now: DateTime<Utc>,
    tickers: &[String],
    alert_hours: i64,
) -> StorageResult<Overview> {
    let tickers: Vec<String> = tickers.iter().map(|t| normalize_ticker(t)).collect();
    let alerts = AlertEngine::new(Arc::clone(&store))
        .scan_at(now, &tickers, alert_hours, None)
        .await;

    let mut overviews = BTreeMap::new();
    for ticker in &tickers {
        let mut latest = BTreeMap::new();
        for family in MetricFamily::ALL {
            if let Some(snapshot) = store.query_latest(ticker, family).await? {
                latest.insert(family, snapshot);
            }
        }
        let alert_count = alerts.alerts.iter().filter(|a| &a.ticker == ticker).count();

        overviews.insert(
            ticker.clone(),
            TickerOverview {
                ticker: ticker.clone(),
                latest,
                alert_count,
            },
        );
    }

    let summary = sentiment_summary(overviews.values());
    Ok(Overview {
        timestamp: now,
        total_tickers: overviews.len(),
        tickers: overviews,
        summary,
    })
}

fn sentiment_summary<'a>(tickers: impl Iterator<Item = &'a TickerOverview>) -> SentimentSummary {
    let mut summary = SentimentSummary {
        bullish_count: 0,
        bearish_count: 0,
        neutral_count: 0,
        avg_sentiment: 0.0,
    };
    let mut scores = Vec::new();

    for overview in tickers {
        let news = overview.latest.get(&MetricFamily::NewsSentiment);
        match news.and_then(|s| s.sentiment("sentiment")) {
            Some(Sentiment::Bullish) => summary.bullish_count += 1,
            Some(Sentiment::Bearish) => summary.bearish_count += 1,
            _ => summary.neutral_count += 1,
        }
        scores.extend(news.and_then(|s| s.number("sentiment_score")));
    }

    if !scores.is_empty() {
        summary.avg_sentiment = round_to(scores.iter().sum::<f64>() / scores.len() as f64, 4);
    }
    summary
}

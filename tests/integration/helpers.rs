//! Helper functions for integration tests

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use stock_monitoring::collection::CollectionOrchestrator;
use stock_monitoring::config::{FetcherConfig, TickerConfig, TickerRegistry};
use stock_monitoring::fetch::Fetcher;
use stock_monitoring::parse::{ParseError, ParserRegistry, PayloadParser};
use stock_monitoring::storage::{MemoryBackend, StorageBackend};
use stock_monitoring::{FieldMap, FieldValue, MetricFamily, Snapshot};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Fetcher settings pointing both providers at `base_url`, without delays.
pub fn fetcher_config(base_url: &str) -> FetcherConfig {
    FetcherConfig {
        timeout_secs: 5,
        max_retries: 1,
        backoff_base_ms: 1,
        max_backoff_ms: 5,
        rate_limit: 1000.0,
        tipranks_base_url: base_url.to_string(),
        trading_central_base_url: base_url.to_string(),
        ..FetcherConfig::default()
    }
}

pub fn fetcher(base_url: &str, token: Option<&str>) -> Arc<Fetcher> {
    Arc::new(Fetcher::new(&fetcher_config(base_url), token.map(str::to_string)).unwrap())
}

pub fn ticker(symbol: &str) -> TickerConfig {
    TickerConfig::new(symbol).with_ids(
        Some(&format!("EQ-{symbol}")),
        Some(&format!("US-{symbol}")),
    )
}

pub fn registry(tickers: Vec<TickerConfig>) -> TickerRegistry {
    TickerRegistry::new(tickers)
}

pub fn orchestrator(
    server: &MockServer,
    store: &MemoryBackend,
    parsers: ParserRegistry,
    tickers: Vec<TickerConfig>,
) -> CollectionOrchestrator {
    CollectionOrchestrator::new(
        fetcher(&server.uri(), Some(TOKEN)),
        Arc::new(store.clone()) as Arc<dyn StorageBackend>,
        parsers,
        registry(tickers),
    )
}

pub fn analyst_payload() -> Value {
    json!({
        "analystConsensus": {
            "consensus": "Moderate Buy",
            "consensusRating": 4.0,
            "numberOfAnalystRatings": 20,
            "buy": 12,
            "hold": 6,
            "sell": 2
        },
        "analystPriceTarget": {"average": 210.0, "high": 250.0, "low": 170.0}
    })
}

pub fn news_payload() -> Value {
    json!({
        "newsSentimentScore": {"stock": {"bullishPercent": 0.65, "bearishPercent": 0.15}},
        "buzz": {"buzz": 1.2, "articlesInLastWeek": 42}
    })
}

pub fn quantamental_payload() -> Value {
    json!({
        "quantamental": 72,
        "quality": 80,
        "valuation": 55,
        "growth": 68,
        "momentum": 61,
        "income": 40
    })
}

pub fn hedge_fund_payload() -> Value {
    json!({"hedgeFundData": {"sentiment": 0.7, "trendAction": "increased", "newPositions": 3}})
}

pub fn crowd_payload() -> Value {
    json!({"rankDay": 4, "rankWeek": 9, "generalStatsAll": {"score": 0.3}})
}

pub fn bloggers_payload() -> Value {
    json!({"bloggerSentiment": {"bullishCount": 8, "bearishCount": 1, "neutralCount": 1}})
}

pub fn technical_payload() -> Value {
    json!({
        "scores": [{
            "short": {"score": 2, "signal": "bullish"},
            "intermediate": {"score": 1, "signal": "bullish"},
            "long": {"score": -1, "signal": "bearish"}
        }]
    })
}

pub fn target_payload() -> Value {
    json!([{"targetPrice": 230.0, "closePrice": 200.0, "targetDate": "2026-12-31"}])
}

/// Mount a 200 response for every endpoint the default families use.
pub async fn mount_all_endpoints(server: &MockServer) {
    let routes = [
        ("^/IB/analystratings$", analyst_payload()),
        ("^/IB/news$", news_payload()),
        ("^/quantamental/v4$", quantamental_payload()),
        ("^/etoro/dataForTicker$", hedge_fund_payload()),
        ("^/widgets/crowd/generalData/[A-Z0-9]+$", crowd_payload()),
        ("^/widgets/bloggers/[A-Z0-9]+$", bloggers_payload()),
        ("^/technicalsummaries/v3$", technical_payload()),
        ("^/target-prices/v4$", target_payload()),
    ];

    for (route, body) in routes {
        Mock::given(method("GET"))
            .and(path_regex(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

pub async fn mount_failure(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .with_priority(1)
        .mount(server)
        .await;
}

/// Parser that always rejects its payload.
pub struct FailingParser;

impl PayloadParser for FailingParser {
    fn parse(&self, _payload: &Value) -> Result<FieldMap, ParseError> {
        Err(ParseError::Invalid("unexpected payload".to_string()))
    }
}

/// Parser that panics, standing in for faulty externally supplied code.
pub struct PanickingParser;

impl PayloadParser for PanickingParser {
    fn parse(&self, _payload: &Value) -> Result<FieldMap, ParseError> {
        panic!("parser exploded")
    }
}

pub fn snapshot(
    ticker: &str,
    family: MetricFamily,
    timestamp: DateTime<Utc>,
    fields: Vec<(&str, FieldValue)>,
) -> Snapshot {
    let fields = fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    Snapshot::at(ticker, family, timestamp, fields, json!({}))
}

pub async fn store_snapshots(store: &dyn StorageBackend, snapshots: Vec<Snapshot>) {
    for snapshot in snapshots {
        let mut tx = store.begin().await.unwrap();
        tx.add_snapshot(snapshot).await.unwrap();
        tx.commit().await.unwrap();
    }
}

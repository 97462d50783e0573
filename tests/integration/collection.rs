//! End-to-end collection against mocked providers
//!
//! These tests verify that:
//! - Every family is attempted in order and logged exactly once
//! - Failures in one family never affect its siblings
//! - Missing identifiers and credentials are reported without a request

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use stock_monitoring::MetricFamily;
use stock_monitoring::collection::{
    CollectionStatus, MISSING_V3_ID_MESSAGE, MISSING_V4_ID_MESSAGE, NO_DATA_MESSAGE,
    TickerOutcome,
};
use stock_monitoring::config::TickerConfig;
use stock_monitoring::parse::ParserRegistry;
use stock_monitoring::parse::classify::Rating;
use stock_monitoring::storage::{MemoryBackend, StorageBackend};
use wiremock::MockServer;

use crate::helpers::{
    FailingParser, PanickingParser, mount_all_endpoints, mount_failure, orchestrator, ticker,
};

#[tokio::test]
async fn test_full_collection_succeeds_for_every_family() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL")],
    );

    let collection = orchestrator.collect_all_for_ticker("aapl").await;

    assert_eq!(collection.ticker, "AAPL");
    assert_eq!(collection.outcome(), TickerOutcome::FullySuccessful);
    assert_eq!(collection.summary.successful, 8);
    assert_eq!(collection.summary.total_records, 8);
    assert_eq!(store.snapshot_count(), 8);

    let logs = store.logs();
    assert_eq!(logs.len(), 8);
    let order: Vec<_> = logs.iter().map(|log| log.family).collect();
    assert_eq!(order, MetricFamily::ALL.to_vec());
    assert!(logs.iter().all(|log| log.success && log.records_collected == 1));

    let analyst = store
        .query_latest("AAPL", MetricFamily::AnalystRatings)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(analyst.rating("consensus_rating"), Some(Rating::ModerateBuy));
    assert_eq!(analyst.number("avg_price_target"), Some(210.0));
}

#[tokio::test]
async fn test_parse_failures_are_isolated_per_family() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let parsers = ParserRegistry::with_defaults()
        .with_parser(MetricFamily::NewsSentiment, FailingParser)
        .with_parser(MetricFamily::CrowdStatistics, FailingParser);
    let orchestrator = orchestrator(&server, &store, parsers, vec![ticker("AAPL")]);

    let collection = orchestrator.collect_all_for_ticker("AAPL").await;

    assert_eq!(collection.summary.successful, 6);
    assert_eq!(collection.summary.failed, 2);
    assert_eq!(collection.outcome(), TickerOutcome::PartiallySuccessful);
    assert_eq!(store.logs().len(), 8);
    assert_eq!(store.snapshot_count(), 6);

    let news = &collection.families[&MetricFamily::NewsSentiment];
    assert_eq!(news.status, CollectionStatus::Error);
    assert_eq!(news.records, 0);
    assert!(news.message.as_deref().unwrap().contains("unexpected payload"));
}

#[tokio::test]
async fn test_panicking_parser_fails_only_its_family() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let parsers = ParserRegistry::with_defaults()
        .with_parser(MetricFamily::BloggerSentiment, PanickingParser);
    let orchestrator = orchestrator(&server, &store, parsers, vec![ticker("AAPL")]);

    let collection = orchestrator.collect_all_for_ticker("AAPL").await;

    assert_eq!(collection.summary.successful, 7);
    let bloggers = &collection.families[&MetricFamily::BloggerSentiment];
    assert!(bloggers.message.as_deref().unwrap().contains("parser exploded"));

    let failed: Vec<_> = store.logs().into_iter().filter(|log| !log.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].family, MetricFamily::BloggerSentiment);
}

#[tokio::test]
async fn test_upstream_error_is_logged_as_no_data() {
    let server = MockServer::start().await;
    mount_failure(&server, "/IB/news", 500).await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL")],
    );

    let result = orchestrator.collect_one("AAPL", MetricFamily::NewsSentiment).await;

    assert_eq!(result.message.as_deref(), Some(NO_DATA_MESSAGE));
    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].error_message.as_deref(), Some(NO_DATA_MESSAGE));
    assert_eq!(logs[0].source, "tipranks");
    assert_eq!(logs[0].endpoint, "/IB/news");
}

#[tokio::test]
async fn test_missing_instrument_ids() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![TickerConfig::new("MSFT")],
    );

    let collection = orchestrator.collect_all_for_ticker("MSFT").await;

    assert_eq!(collection.summary.successful, 5);
    assert_eq!(
        collection.families[&MetricFamily::TechnicalIndicators].message.as_deref(),
        Some(MISSING_V3_ID_MESSAGE)
    );
    assert_eq!(
        collection.families[&MetricFamily::QuantamentalScores].message.as_deref(),
        Some(MISSING_V4_ID_MESSAGE)
    );

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests
            .iter()
            .all(|r| !r.url.path().contains("/v3") && !r.url.path().contains("/v4"))
    );
    assert_eq!(store.logs().len(), 8);
}

#[tokio::test]
async fn test_invalid_ticker_is_rejected_without_logging() {
    let server = MockServer::start().await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(&server, &store, ParserRegistry::with_defaults(), vec![]);

    let collection = orchestrator.collect_all_for_ticker("NOT A TICKER").await;

    assert!(collection.error.is_some());
    assert!(collection.families.is_empty());
    assert_eq!(collection.outcome(), TickerOutcome::Failed);
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_fleet_collection_in_configuration_order() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("TSLA"), ticker("AAPL"), TickerConfig::new("NVDA")],
    );

    let fleet = orchestrator.collect_all_tickers().await;

    let order: Vec<_> = fleet.tickers.iter().map(|c| c.ticker.as_str()).collect();
    assert_eq!(order, ["TSLA", "AAPL", "NVDA"]);
    assert_eq!(fleet.summary.total_tickers, 3);
    assert_eq!(fleet.summary.fully_successful, 2);
    assert_eq!(fleet.summary.partially_successful, 1);
    assert_eq!(fleet.summary.failed, 0);
    assert_eq!(fleet.summary.total_records, 8 + 8 + 5);
    assert_eq!(store.logs().len(), 24);

    let summary = orchestrator.collection_summary(24).await.unwrap();
    assert_eq!(summary.total_collections, 24);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.success_rate, 87.5);
}

#[tokio::test]
async fn test_single_family_collection() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL")],
    );

    let result = orchestrator.collect_one("AAPL", MetricFamily::TargetPrices).await;
    assert!(result.is_success());
    assert_eq!(result.records, 1);

    let target = store
        .query_latest("AAPL", MetricFamily::TargetPrices)
        .await
        .unwrap();
    assert_matches!(target, Some(snapshot) if snapshot.number("upside_potential") == Some(15.0));
}

#[tokio::test]
async fn test_overview_after_collection() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL"), ticker("MSFT")],
    );
    orchestrator.collect_all_for_ticker("AAPL").await;

    let overview = orchestrator.overview(24).await.unwrap();
    assert_eq!(overview.total_tickers, 2);

    let aapl = &overview.tickers["AAPL"];
    assert_eq!(aapl.latest.len(), 8);
    assert_eq!(
        aapl.latest[&MetricFamily::AnalystRatings].number("avg_price_target"),
        Some(210.0)
    );
    // rank 4 in the daily crowd ranking is the only alert without history
    assert_eq!(aapl.alert_count, 1);

    let msft = &overview.tickers["MSFT"];
    assert!(msft.latest.is_empty());
    assert_eq!(msft.alert_count, 0);

    let summary = &overview.summary;
    assert_eq!(
        summary.bullish_count + summary.bearish_count + summary.neutral_count,
        2
    );
}

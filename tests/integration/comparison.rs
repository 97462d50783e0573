//! Comparisons over collected and historical snapshots

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use stock_monitoring::compare::{ComparisonEngine, ComparisonError, Trend};
use stock_monitoring::parse::ParserRegistry;
use stock_monitoring::storage::{MemoryBackend, StorageBackend};
use stock_monitoring::{FieldValue, MetricFamily};
use wiremock::MockServer;

use crate::helpers::{mount_all_endpoints, orchestrator, snapshot, store_snapshots, ticker};

#[tokio::test]
async fn test_collected_snapshot_compared_against_history() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    store_snapshots(
        &store,
        vec![snapshot(
            "AAPL",
            MetricFamily::AnalystRatings,
            Utc::now() - Duration::days(2),
            vec![
                ("avg_price_target", FieldValue::Number(200.0)),
                ("buy_count", FieldValue::Number(12.0)),
            ],
        )],
    )
    .await;

    let orchestrator = orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL")],
    );
    assert!(orchestrator.collect_one("AAPL", MetricFamily::AnalystRatings).await.is_success());

    let engine = ComparisonEngine::new(Arc::new(store.clone()));
    let comparison = engine
        .compare_periods("AAPL", MetricFamily::AnalystRatings, &["1d", "1w"])
        .await
        .unwrap();

    let [day, week] = comparison.periods.as_slice() else {
        panic!("expected two periods");
    };
    assert_eq!(week.data_timestamp, None);
    assert_eq!(week.metrics["avg_price_target"].trend, Trend::Unknown);

    let target = &day.metrics["avg_price_target"];
    assert_eq!(target.percentage_change, Some(5.0));
    assert_eq!(target.trend, Trend::Up);
    assert_eq!(day.metrics["buy_count"].trend, Trend::Stable);
}

#[tokio::test]
async fn test_cross_ticker_ranking() {
    let store = MemoryBackend::new();
    let now = Utc::now();
    let mut snapshots = Vec::new();
    let moves = [("AAPL", 50.0, 60.0), ("MSFT", 50.0, 45.0), ("TSLA", 50.0, 75.0)];
    for (symbol, before, after) in moves {
        for (age, score) in [(Duration::days(8), before), (Duration::minutes(5), after)] {
            snapshots.push(snapshot(
                symbol,
                MetricFamily::QuantamentalScores,
                now - age,
                vec![("overall_score", FieldValue::Number(score))],
            ));
        }
    }
    store_snapshots(&store, snapshots).await;

    let engine = ComparisonEngine::new(Arc::new(store) as Arc<dyn StorageBackend>);
    let tickers = ["AAPL", "MSFT", "TSLA", "NVDA"].map(String::from);
    let comparison = engine
        .compare_tickers(&tickers, MetricFamily::QuantamentalScores, "1w")
        .await
        .unwrap();

    assert_eq!(comparison.tickers.len(), 3);
    assert_eq!(comparison.hours_ago, 168);
    let ranking = comparison.rank_by("overall_score");
    assert_eq!(
        ranking,
        vec![
            ("TSLA".to_string(), 50.0),
            ("AAPL".to_string(), 20.0),
            ("MSFT".to_string(), -10.0)
        ]
    );
}

#[tokio::test]
async fn test_compare_all_skips_families_without_data() {
    let store = MemoryBackend::new();
    store_snapshots(
        &store,
        vec![snapshot(
            "AAPL",
            MetricFamily::TargetPrices,
            Utc::now(),
            vec![("target_price", FieldValue::Number(230.0))],
        )],
    )
    .await;

    let engine = ComparisonEngine::new(Arc::new(store));
    let all = engine.compare_all("aapl", &["1d"]).await.unwrap();

    assert_eq!(all.ticker, "AAPL");
    assert_eq!(all.families.keys().copied().collect::<Vec<_>>(), vec![MetricFamily::TargetPrices]);

    let missing = engine
        .compare_periods("AAPL", MetricFamily::NewsSentiment, &["1d"])
        .await;
    assert_matches!(missing, Err(ComparisonError::NoData { .. }));

    let invalid = engine.compare_all("AAPL", &["yesterday"]).await;
    assert_matches!(invalid, Err(ComparisonError::InvalidPeriod(_)));
}

//! Collection persisted to SQLite

use std::sync::Arc;

use chrono::{Duration, Utc};
use stock_monitoring::collection::CollectionOrchestrator;
use stock_monitoring::compare::ComparisonEngine;
use stock_monitoring::parse::ParserRegistry;
use stock_monitoring::storage::StorageBackend;
use stock_monitoring::storage::sqlite::SqliteBackend;
use stock_monitoring::{FieldValue, MetricFamily};
use tempfile::tempdir;
use wiremock::MockServer;

use crate::helpers::{
    FailingParser, TOKEN, fetcher, mount_all_endpoints, registry, snapshot, store_snapshots, ticker,
};

async fn sqlite_orchestrator(
    server: &MockServer,
    store: Arc<dyn StorageBackend>,
    parsers: ParserRegistry,
) -> CollectionOrchestrator {
    CollectionOrchestrator::new(
        fetcher(&server.uri(), Some(TOKEN)),
        store,
        parsers,
        registry(vec![ticker("AAPL")]),
    )
}

#[tokio::test]
async fn test_collection_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("stocks.db");
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;

    {
        let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let parsers =
            ParserRegistry::with_defaults().with_parser(MetricFamily::TargetPrices, FailingParser);
        let orchestrator = sqlite_orchestrator(&server, Arc::clone(&store), parsers).await;

        let collection = orchestrator.collect_all_for_ticker("AAPL").await;
        assert_eq!(collection.summary.successful, 7);
        store.close().await.unwrap();
    }

    let store = SqliteBackend::new(&db_path).await.unwrap();
    let health = store.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.snapshot_count, 7);
    assert_eq!(health.log_count, 8);

    let analyst = store
        .query_latest("AAPL", MetricFamily::AnalystRatings)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(analyst.number("buy_count"), Some(12.0));
    assert_eq!(analyst.raw_payload["analystPriceTarget"]["average"], 210.0);

    let logs = store
        .query_logs_since(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    let failed: Vec<_> = logs.iter().filter(|log| !log.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].family, MetricFamily::TargetPrices);
    assert_eq!(failed[0].source, "trading_central");
}

#[tokio::test]
async fn test_comparison_over_sqlite_history() {
    let temp_dir = tempdir().unwrap();
    let store: Arc<dyn StorageBackend> =
        Arc::new(SqliteBackend::new(temp_dir.path().join("history.db")).await.unwrap());
    let now = Utc::now();

    store_snapshots(
        store.as_ref(),
        vec![
            snapshot(
                "TSLA",
                MetricFamily::TargetPrices,
                now - Duration::days(40),
                vec![("target_price", FieldValue::Number(300.0))],
            ),
            snapshot(
                "TSLA",
                MetricFamily::TargetPrices,
                now - Duration::hours(2),
                vec![("target_price", FieldValue::Number(240.0))],
            ),
        ],
    )
    .await;

    let engine = ComparisonEngine::new(Arc::clone(&store));
    let comparison = engine
        .compare_periods("TSLA", MetricFamily::TargetPrices, &["1M"])
        .await
        .unwrap();
    assert_eq!(
        comparison.periods[0].metrics["target_price"].percentage_change,
        Some(-20.0)
    );

    let removed = store
        .cleanup_old_snapshots(now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

//! Scheduler driving real collection runs

use std::sync::Arc;
use std::time::Duration;

use stock_monitoring::actors::{
    CollectionReport, RunTrigger, SchedulerHandle, SchedulerSettings,
};
use stock_monitoring::alerts::AlertEngine;
use stock_monitoring::parse::ParserRegistry;
use stock_monitoring::storage::MemoryBackend;
use tokio::sync::broadcast;
use wiremock::MockServer;

use crate::helpers::{mount_all_endpoints, orchestrator, ticker};

fn settings(run_initial: bool) -> SchedulerSettings {
    SchedulerSettings {
        interval: Duration::from_secs(3600),
        run_initial,
        retention_days: Some(365),
    }
}

#[tokio::test]
async fn test_initial_run_collects_fleet() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = Arc::new(orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL"), ticker("MSFT")],
    ));

    let (event_tx, mut event_rx) = broadcast::channel(8);
    let handle = SchedulerHandle::spawn(orchestrator, settings(true), event_tx);

    let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.trigger, RunTrigger::Scheduled);
    assert_eq!(event.report.tickers(), vec!["AAPL", "MSFT"]);
    assert_eq!(event.report.total_records(), 16);
    assert_eq!(store.snapshot_count(), 16);

    let status = handle.status().await.unwrap();
    assert_eq!(status.runs_completed, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_manual_runs_are_serialized() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = Arc::new(orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL")],
    ));

    let (event_tx, _event_rx) = broadcast::channel(8);
    let handle = SchedulerHandle::spawn(orchestrator, settings(false), event_tx);

    let first = handle.clone();
    let second = handle.clone();
    let (a, b) = tokio::join!(
        first.collect_now(Some("AAPL".into())),
        second.collect_now(None)
    );

    assert!(matches!(a.unwrap(), CollectionReport::Ticker(_)));
    assert!(matches!(b.unwrap(), CollectionReport::Fleet(_)));
    assert_eq!(store.logs().len(), 16);
    assert_eq!(handle.status().await.unwrap().runs_completed, 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_feed_alert_scans() {
    let server = MockServer::start().await;
    mount_all_endpoints(&server).await;
    let store = MemoryBackend::new();
    let orchestrator = Arc::new(orchestrator(
        &server,
        &store,
        ParserRegistry::with_defaults(),
        vec![ticker("AAPL")],
    ));
    let engine = AlertEngine::new(Arc::new(store.clone()));

    let (event_tx, mut event_rx) = broadcast::channel(8);
    let handle = SchedulerHandle::spawn(orchestrator, settings(false), event_tx);
    handle.collect_now(None).await.unwrap();

    let event = event_rx.recv().await.unwrap();
    let report = engine.scan(&event.report.tickers(), 24, None).await;

    // only the crowd rank (4) qualifies without history
    assert_eq!(report.total_alerts, 1);
    assert_eq!(report.alerts[0].ticker, "AAPL");

    handle.shutdown().await.unwrap();
}

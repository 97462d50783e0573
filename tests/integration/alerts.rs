//! Alert scanning over stored snapshots

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use stock_monitoring::alerts::{AlertEngine, AlertType, Severity};
use stock_monitoring::parse::classify::{Rating, Sentiment};
use stock_monitoring::storage::MemoryBackend;
use stock_monitoring::{FieldValue, MetricFamily};

use crate::helpers::{snapshot, store_snapshots};

async fn seeded_store() -> MemoryBackend {
    let store = MemoryBackend::new();
    let now = Utc::now();
    let earlier = now - Duration::hours(30);

    store_snapshots(
        &store,
        vec![
            snapshot(
                "AAPL",
                MetricFamily::AnalystRatings,
                earlier,
                vec![
                    ("consensus_rating", FieldValue::Rating(Rating::Buy)),
                    ("avg_price_target", FieldValue::Number(200.0)),
                ],
            ),
            snapshot(
                "AAPL",
                MetricFamily::AnalystRatings,
                now,
                vec![
                    ("consensus_rating", FieldValue::Rating(Rating::Sell)),
                    ("avg_price_target", FieldValue::Number(170.0)),
                ],
            ),
            snapshot(
                "AAPL",
                MetricFamily::NewsSentiment,
                now - Duration::hours(2),
                vec![("sentiment", FieldValue::Sentiment(Sentiment::Neutral))],
            ),
            snapshot(
                "MSFT",
                MetricFamily::CrowdStatistics,
                now - Duration::hours(1),
                vec![("rank_day", FieldValue::Number(7.0))],
            ),
            snapshot(
                "MSFT",
                MetricFamily::HedgeFundData,
                now,
                vec![("new_positions", FieldValue::Number(20.0))],
            ),
        ],
    )
    .await;

    store
}

#[tokio::test]
async fn test_scan_reports_sorted_alerts() {
    let engine = AlertEngine::new(Arc::new(seeded_store().await));
    let tickers = vec!["AAPL".to_string(), "msft".to_string()];

    let report = engine.scan(&tickers, 24, None).await;

    let kinds: Vec<_> = report
        .alerts
        .iter()
        .map(|alert| (alert.ticker.as_str(), alert.alert_type, alert.severity))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("AAPL", AlertType::RatingChange, Severity::High),
            ("AAPL", AlertType::PriceTargetChange, Severity::Medium),
            ("MSFT", AlertType::Trending, Severity::Low),
        ]
    );
    assert_eq!(report.total_alerts, 3);
    assert_eq!(report.hours_ago, 24);
}

#[tokio::test]
async fn test_severity_filter_applies_after_sorting() {
    let engine = AlertEngine::new(Arc::new(seeded_store().await));
    let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];

    let report = engine.scan(&tickers, 24, Some(Severity::Medium)).await;

    assert_eq!(report.total_alerts, 1);
    assert_eq!(report.alerts[0].alert_type, AlertType::PriceTargetChange);
    assert_eq!(report.alerts[0].message, "Price target changed by -15.0%");
}

#[tokio::test]
async fn test_alert_serialization_shape() {
    let engine = AlertEngine::new(Arc::new(seeded_store().await));

    let report = engine.scan(&["AAPL".to_string()], 24, Some(Severity::High)).await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["total_alerts"], 1);
    assert_eq!(json["alerts"][0]["type"], "RATING_CHANGE");
    assert_eq!(json["alerts"][0]["severity"], "high");
    assert_eq!(
        json["alerts"][0]["message"],
        "Analyst consensus changed from Buy to Sell"
    );
}

#[tokio::test]
async fn test_no_history_no_alerts() {
    let engine = AlertEngine::new(Arc::new(MemoryBackend::new()));
    let report = engine.scan(&["AAPL".to_string()], 24, None).await;
    assert_eq!(report.total_alerts, 0);
    assert!(report.alerts.is_empty());
}

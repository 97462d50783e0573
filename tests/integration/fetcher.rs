//! Fetcher behaviour against a mocked provider
//!
//! These tests verify that:
//! - Each addressing scheme produces the right URL, query and headers
//! - Missing credentials fail before any network call
//! - Rate limiting spaces out concurrent fetches

use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use serde_json::json;
use stock_monitoring::fetch::{Endpoint, FetchError, FetchRequest, Fetcher, Provider};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{TOKEN, fetcher, fetcher_config};

#[tokio::test]
async fn test_v3_endpoint_sends_id_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/technicalsummaries/v3"))
        .and(query_param("id", "US-123705"))
        .and(query_param("token", TOKEN))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), Some(TOKEN));
    let value = fetcher
        .fetch_endpoint(&Endpoint::TECHNICAL_SUMMARIES, "US-123705")
        .await
        .unwrap();

    assert_eq!(value, json!({"ok": true}));
}

#[tokio::test]
async fn test_v4_path_endpoint_uses_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article-sentiments/v5/entities/EQ-1"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&format!("{}/", server.uri()), Some(TOKEN));
    let value = fetcher
        .fetch_endpoint(&Endpoint::ARTICLE_SENTIMENTS, "EQ-1")
        .await
        .unwrap();

    assert_eq!(value, json!([]));
}

#[tokio::test]
async fn test_missing_token_fails_before_request() {
    let server = MockServer::start().await;
    let fetcher = fetcher(&server.uri(), None);

    for endpoint in [Endpoint::QUANTAMENTAL, Endpoint::STOP_TIMESERIES] {
        let result = fetcher.fetch_endpoint(&endpoint, "EQ-1").await;
        assert_matches!(result, Err(FetchError::Configuration(_)));
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ticker_path_addressing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widgets/bloggers/NVDA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bloggerSentiment": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), None);
    fetcher
        .fetch_endpoint(&Endpoint::BLOGGERS, "NVDA")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_fetch_many_respects_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/IB/news"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(4)
        .mount(&server)
        .await;

    let mut config = fetcher_config(&server.uri());
    config.rate_limit = 10.0;
    let fetcher = Fetcher::new(&config, None).unwrap();

    let requests: Vec<_> = ["AAPL", "MSFT", "TSLA", "NVDA"]
        .into_iter()
        .map(|ticker| {
            FetchRequest::get(Provider::TipRanks, format!("{}/IB/news", server.uri()))
                .param("ticker", ticker)
                .with_key(ticker)
        })
        .collect();

    let started = Instant::now();
    let results = fetcher.fetch_many(requests).await;

    assert!(started.elapsed() >= Duration::from_millis(290));
    assert_eq!(results.len(), 4);
    assert!(results.values().all(Option::is_some));
}

#[tokio::test]
async fn test_cache_shared_between_endpoint_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/IB/analystratings"))
        .and(query_param("ticker", "AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"a": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), None);
    for _ in 0..3 {
        fetcher
            .fetch_endpoint(&Endpoint::ANALYST_RATINGS, "AAPL")
            .await
            .unwrap();
    }

    assert_eq!(fetcher.cache().len(), 1);
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::cache::ResponseCache;
use super::error::{FetchError, FetchResult};
use super::provider::{Endpoint, Provider, ProviderUrls};
use super::rate_limiter::RateLimiter;
use super::retry::{RetryAction, RetryPolicy, is_retryable_status, retry_with_backoff};
use crate::config::FetcherConfig;

/// Upper bound on in-flight requests for [`Fetcher::fetch_many`].
pub const MAX_CONCURRENT_FETCHES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// A single outbound request.
///
/// `key` names the request in [`Fetcher::fetch_many`] results. GET requests
/// send `params` as the query string, POST requests as a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub key: String,
    pub provider: Provider,
    pub method: HttpMethod,
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub headers: Vec<(String, String)>,
    pub use_cache: bool,
}

impl FetchRequest {
    pub fn get(provider: Provider, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            key: url.clone(),
            provider,
            method: HttpMethod::Get,
            url,
            params: BTreeMap::new(),
            headers: Vec::new(),
            use_cache: true,
        }
    }

    pub fn post(provider: Provider, url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(provider, url)
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Method, URL and canonically ordered parameters.
    pub fn cache_key(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}:{}:{}", self.method, self.url, params)
    }
}

/// Cached, rate limited, retrying HTTP client for the providers.
pub struct Fetcher {
    client: reqwest::Client,
    cache: ResponseCache,
    tipranks_limiter: RateLimiter,
    trading_central_limiter: RateLimiter,
    retry: RetryPolicy,
    urls: ProviderUrls,
    token: Option<String>,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig, token: Option<String>) -> FetchResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            cache: ResponseCache::new(
                config.cache_max_size,
                Duration::from_secs(config.cache_ttl_secs),
            ),
            tipranks_limiter: RateLimiter::new(config.rate_limit),
            trading_central_limiter: RateLimiter::new(config.rate_limit),
            retry: config.retry_policy(),
            urls: config.urls(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn limiter(&self, provider: Provider) -> &RateLimiter {
        match provider {
            Provider::TipRanks => &self.tipranks_limiter,
            Provider::TradingCentral => &self.trading_central_limiter,
        }
    }

    /// Build the request for `endpoint` addressed by `identifier`.
    pub fn request_for(&self, endpoint: &Endpoint, identifier: &str) -> FetchResult<FetchRequest> {
        endpoint.request(&self.urls, identifier, self.token.as_deref())
    }

    pub async fn fetch_endpoint(
        &self,
        endpoint: &Endpoint,
        identifier: &str,
    ) -> FetchResult<Value> {
        let request = self.request_for(endpoint, identifier)?;
        self.fetch(&request).await
    }

    /// Fetch one request, serving from cache when possible.
    ///
    /// Only successful responses are cached. The rate limiter is consulted
    /// once per cache miss; retries are spaced by the backoff policy.
    #[instrument(skip(self, request), fields(key = %request.key))]
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult<Value> {
        let cache_key = request.cache_key();

        if request.use_cache
            && let Some(value) = self.cache.get(&cache_key)
        {
            debug!("cache hit for {}", request.url);
            return Ok(value);
        }

        self.limiter(request.provider).acquire().await;

        let result = retry_with_backoff(&self.retry, |_| self.attempt(request)).await;

        match result {
            Ok(value) => {
                if request.use_cache {
                    self.cache.set(cache_key, value.clone());
                }
                Ok(value)
            }
            Err(err) => {
                warn!("request to {} failed: {}", request.url, err);
                Err(err)
            }
        }
    }

    /// Fetch many requests concurrently.
    ///
    /// Failures are isolated: a failed request maps to `None` under its key.
    pub async fn fetch_many(&self, requests: Vec<FetchRequest>) -> HashMap<String, Option<Value>> {
        let workers = requests.len().clamp(1, MAX_CONCURRENT_FETCHES);

        futures::stream::iter(requests)
            .map(|request| async move {
                let value = self.fetch(&request).await.ok();
                (request.key, value)
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }

    async fn attempt(&self, request: &FetchRequest) -> RetryAction<Value> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url).query(&request.params),
            HttpMethod::Post => self.client.post(&request.url).json(&request.params),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return RetryAction::Retry(FetchError::Transient {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                return RetryAction::Fail(FetchError::Request {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            if is_retryable_status(status) {
                return RetryAction::Retry(FetchError::Transient {
                    url: request.url.clone(),
                    reason: format!("HTTP {}", status.as_u16()),
                });
            }
            return RetryAction::Fail(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return RetryAction::Retry(FetchError::Transient {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                return RetryAction::Fail(FetchError::Request {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
        };

        match serde_json::from_str(&body) {
            Ok(value) => RetryAction::Success(value),
            Err(e) => RetryAction::Fail(FetchError::Decode {
                url: request.url.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

//! HTTP access to the upstream market-data providers.
//!
//! Every outbound request goes through [`Fetcher`], which layers a response
//! cache, a per-provider rate limiter and retry with exponential backoff on
//! top of a shared `reqwest` client.

pub mod cache;
pub mod client;
pub mod error;
pub mod provider;
pub mod rate_limiter;
pub mod retry;

pub use cache::ResponseCache;
pub use client::{FetchRequest, Fetcher, HttpMethod};
pub use error::{FetchError, FetchResult};
pub use provider::{Addressing, Endpoint, Identifier, Provider, ProviderUrls};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;

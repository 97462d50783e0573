//! Upstream providers and the endpoints collected from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::client::FetchRequest;
use super::error::{FetchError, FetchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    TipRanks,
    TradingCentral,
}

impl Provider {
    /// Source label recorded on collection log entries.
    pub fn source(&self) -> &'static str {
        match self {
            Provider::TipRanks => "tipranks",
            Provider::TradingCentral => "trading_central",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}

/// How the instrument identifier and credentials are attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `?ticker=<TICKER>`
    TickerQuery,
    /// `<path>/<TICKER>`
    TickerPath,
    /// Bearer token, `?id=<v4 id>`
    BearerQuery,
    /// Bearer token, `<path>/<v4 id>`
    BearerPath,
    /// `?id=<v3 id>&token=<token>`
    TokenQuery,
}

/// Which identifier an endpoint is addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    Ticker,
    V4Id,
    V3Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub name: &'static str,
    pub provider: Provider,
    pub path: &'static str,
    pub addressing: Addressing,
}

impl Endpoint {
    pub const ANALYST_RATINGS: Endpoint =
        Endpoint::tipranks("analyst_ratings", "/IB/analystratings", Addressing::TickerQuery);
    pub const NEWS: Endpoint = Endpoint::tipranks("news", "/IB/news", Addressing::TickerQuery);
    pub const STOCK_OVERVIEW: Endpoint = Endpoint::tipranks(
        "stock_overview",
        "/widgets/stockAnalysisOverview",
        Addressing::TickerQuery,
    );
    pub const ETORO_DATA: Endpoint =
        Endpoint::tipranks("etoro_data", "/etoro/dataForTicker", Addressing::TickerQuery);
    pub const CROWD_DATA: Endpoint =
        Endpoint::tipranks("crowd_data", "/widgets/crowd/generalData", Addressing::TickerPath);
    pub const BLOGGERS: Endpoint =
        Endpoint::tipranks("bloggers", "/widgets/bloggers", Addressing::TickerPath);

    pub const QUANTAMENTAL: Endpoint =
        Endpoint::trading_central("quantamental", "/quantamental/v4", Addressing::BearerQuery);
    pub const TARGET_PRICES: Endpoint =
        Endpoint::trading_central("target_prices", "/target-prices/v4", Addressing::BearerQuery);
    pub const ARTICLE_ANALYTICS: Endpoint = Endpoint::trading_central(
        "article_analytics",
        "/article-analytics/v4/entities",
        Addressing::BearerPath,
    );
    pub const ARTICLE_SENTIMENTS: Endpoint = Endpoint::trading_central(
        "article_sentiments",
        "/article-sentiments/v5/entities",
        Addressing::BearerPath,
    );
    pub const TECHNICAL_SUMMARIES: Endpoint = Endpoint::trading_central(
        "technical_summaries",
        "/technicalsummaries/v3",
        Addressing::TokenQuery,
    );
    pub const SUPPORT_RESISTANCE: Endpoint = Endpoint::trading_central(
        "support_resistance",
        "/supportandresistance/v3",
        Addressing::TokenQuery,
    );
    pub const STOP_TIMESERIES: Endpoint =
        Endpoint::trading_central("stop_timeseries", "/stoptimeseries/v3", Addressing::TokenQuery);
    pub const INSTRUMENT_EVENTS: Endpoint = Endpoint::trading_central(
        "instrument_events",
        "/instrumentevents/v3",
        Addressing::TokenQuery,
    );

    pub const ALL: [Endpoint; 14] = [
        Endpoint::ANALYST_RATINGS,
        Endpoint::NEWS,
        Endpoint::STOCK_OVERVIEW,
        Endpoint::ETORO_DATA,
        Endpoint::CROWD_DATA,
        Endpoint::BLOGGERS,
        Endpoint::QUANTAMENTAL,
        Endpoint::TARGET_PRICES,
        Endpoint::ARTICLE_ANALYTICS,
        Endpoint::ARTICLE_SENTIMENTS,
        Endpoint::TECHNICAL_SUMMARIES,
        Endpoint::SUPPORT_RESISTANCE,
        Endpoint::STOP_TIMESERIES,
        Endpoint::INSTRUMENT_EVENTS,
    ];

    const fn tipranks(name: &'static str, path: &'static str, addressing: Addressing) -> Self {
        Self {
            name,
            provider: Provider::TipRanks,
            path,
            addressing,
        }
    }

    const fn trading_central(
        name: &'static str,
        path: &'static str,
        addressing: Addressing,
    ) -> Self {
        Self {
            name,
            provider: Provider::TradingCentral,
            path,
            addressing,
        }
    }

    pub fn by_name(name: &str) -> Option<Endpoint> {
        Endpoint::ALL.into_iter().find(|e| e.name == name)
    }

    pub fn identifier(&self) -> Identifier {
        match self.addressing {
            Addressing::TickerQuery | Addressing::TickerPath => Identifier::Ticker,
            Addressing::BearerQuery | Addressing::BearerPath => Identifier::V4Id,
            Addressing::TokenQuery => Identifier::V3Id,
        }
    }

    /// Build the request for this endpoint.
    ///
    /// Trading Central endpoints require `token`; a missing token is a
    /// configuration error and no request is produced.
    pub fn request(
        &self,
        urls: &ProviderUrls,
        identifier: &str,
        token: Option<&str>,
    ) -> FetchResult<FetchRequest> {
        let base = urls.base(self.provider);
        let token = match self.provider {
            Provider::TipRanks => None,
            Provider::TradingCentral => Some(token.filter(|t| !t.is_empty()).ok_or_else(|| {
                FetchError::Configuration("Trading Central token not configured".to_string())
            })?),
        };

        let request = match self.addressing {
            Addressing::TickerQuery => {
                FetchRequest::get(self.provider, build_url(base, self.path, None))
                    .param("ticker", identifier)
            }
            Addressing::TickerPath => {
                FetchRequest::get(self.provider, build_url(base, self.path, Some(identifier)))
            }
            Addressing::BearerQuery => {
                FetchRequest::get(self.provider, build_url(base, self.path, None))
                    .param("id", identifier)
            }
            Addressing::BearerPath => {
                FetchRequest::get(self.provider, build_url(base, self.path, Some(identifier)))
            }
            Addressing::TokenQuery => {
                FetchRequest::get(self.provider, build_url(base, self.path, None))
                    .param("id", identifier)
            }
        };

        let request = match (self.addressing, token) {
            (Addressing::BearerQuery | Addressing::BearerPath, Some(token)) => {
                request.header("Authorization", format!("Bearer {token}"))
            }
            (Addressing::TokenQuery, Some(token)) => request.param("token", token),
            _ => request,
        };

        Ok(request.with_key(self.name))
    }
}

/// Base URLs of the two providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUrls {
    pub tipranks: String,
    pub trading_central: String,
}

impl ProviderUrls {
    pub fn base(&self, provider: Provider) -> &str {
        match provider {
            Provider::TipRanks => &self.tipranks,
            Provider::TradingCentral => &self.trading_central,
        }
    }
}

/// Join a base URL, a path and an optional trailing segment with single slashes.
pub fn build_url(base: &str, path: &str, segment: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(segment) = segment {
        url = format!(
            "{}/{}",
            url.trim_end_matches('/'),
            segment.trim_start_matches('/')
        );
    }
    url
}

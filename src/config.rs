use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{trace, warn};

use crate::fetch::{ProviderUrls, RetryPolicy};
use crate::util::{is_valid_ticker, normalize_ticker};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Snapshots older than this are deleted after each collection run
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl StorageConfig {
    pub fn retention_days(&self) -> Option<u32> {
        match self {
            StorageConfig::None => None,
            StorageConfig::Sqlite { retention_days, .. } => Some(*retention_days),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./stocks.db")
}

fn default_retention_days() -> u32 {
    365
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tickers: Vec<TickerConfig>,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Absent means in-memory storage. A `sqlite` section without a path
    /// uses `./stocks.db`.
    pub storage: Option<StorageConfig>,

    /// Falls back to `TRADING_CENTRAL_TOKEN` when absent
    pub trading_central_token: Option<String>,
}

impl Config {
    pub fn token(&self) -> Option<String> {
        self.trading_central_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(crate::util::get_trading_central_token)
    }

    pub fn registry(&self) -> TickerRegistry {
        TickerRegistry::new(self.tickers.clone())
    }
}

/// A tracked ticker and its provider instrument ids.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TickerConfig {
    pub ticker: String,
    pub exchange: Option<String>,
    /// Trading Central v4 instrument id
    pub v4_id: Option<String>,
    /// Trading Central v3 instrument id
    pub v3_id: Option<String>,
}

impl TickerConfig {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            exchange: None,
            v4_id: None,
            v3_id: None,
        }
    }

    pub fn with_ids(mut self, v4_id: Option<&str>, v3_id: Option<&str>) -> Self {
        self.v4_id = v4_id.map(str::to_string);
        self.v3_id = v3_id.map(str::to_string);
        self
    }
}

/// Tracked tickers in configuration order, keyed by normalized symbol.
#[derive(Debug, Clone, Default)]
pub struct TickerRegistry {
    order: Vec<String>,
    entries: HashMap<String, TickerConfig>,
}

impl TickerRegistry {
    pub fn new(configs: Vec<TickerConfig>) -> Self {
        let mut registry = Self::default();
        for mut config in configs {
            let ticker = normalize_ticker(&config.ticker);
            if !is_valid_ticker(&ticker) {
                warn!("skipping invalid ticker in configuration: {:?}", config.ticker);
                continue;
            }
            if registry.entries.contains_key(&ticker) {
                warn!("duplicate ticker in configuration: {ticker}");
                continue;
            }
            config.ticker = ticker.clone();
            registry.order.push(ticker.clone());
            registry.entries.insert(ticker, config);
        }
        registry
    }

    pub fn tickers(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, ticker: &str) -> Option<&TickerConfig> {
        self.entries.get(&normalize_ticker(ticker))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Requests per second, per provider
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_tipranks_base_url")]
    pub tipranks_base_url: String,
    #[serde(default = "default_trading_central_base_url")]
    pub trading_central_base_url: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_size: default_cache_max_size(),
            rate_limit: default_rate_limit(),
            tipranks_base_url: default_tipranks_base_url(),
            trading_central_base_url: default_trading_central_base_url(),
        }
    }
}

impl FetcherConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms.max(self.backoff_base_ms)),
        }
    }

    pub fn urls(&self) -> ProviderUrls {
        ProviderUrls {
            tipranks: self.tipranks_base_url.clone(),
            trading_central: self.trading_central_base_url.clone(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_tipranks_base_url() -> String {
    "https://www.tipranks.com/api".to_string()
}

fn default_trading_central_base_url() -> String {
    "https://api.tradingcentral.com".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// Run a collection immediately on start
    #[serde(default = "default_run_initial")]
    pub run_initial: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            run_initial: default_run_initial(),
        }
    }
}

/// Longest accepted collection interval, ten years.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365 * 10;

pub const MAX_INTERVAL: Duration = Duration::from_secs(MAX_INTERVAL_HOURS * 3600);

impl SchedulerConfig {
    /// Interval clamped to `1..=MAX_INTERVAL_HOURS` hours.
    pub fn interval(&self) -> Duration {
        let hours = self.interval_hours.clamp(1, MAX_INTERVAL_HOURS);
        Duration::from_secs(hours * 3600)
    }
}

fn default_interval_hours() -> u64 {
    1
}

fn default_run_initial() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;

    if !(config.fetcher.rate_limit.is_finite() && config.fetcher.rate_limit > 0.0) {
        anyhow::bail!("fetcher.rate_limit must be a positive number");
    }
    if config.fetcher.cache_max_size == 0 {
        anyhow::bail!("fetcher.cache_max_size must be at least 1");
    }
    if config.scheduler.interval_hours > MAX_INTERVAL_HOURS {
        anyhow::bail!("scheduler.interval_hours must be at most {MAX_INTERVAL_HOURS}");
    }

    Ok(config)
}

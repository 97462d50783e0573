use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::audit::CollectionAudit;
use super::summary::{CollectionSummary, Overview, collection_summary, overview};
use super::{
    CollectError, FamilyResult, FleetCollection, FleetSummary, MISSING_V3_ID_MESSAGE,
    MISSING_V4_ID_MESSAGE, TickerCollection, TickerOutcome, TickerSummary,
};
use crate::config::TickerRegistry;
use crate::fetch::{Endpoint, Fetcher, Identifier};
use crate::parse::ParserRegistry;
use crate::storage::{StorageBackend, StorageResult};
use crate::util::{is_valid_ticker, normalize_ticker};
use crate::{MetricFamily, Snapshot};

/// Collects every metric family for the tracked tickers.
pub struct CollectionOrchestrator {
    fetcher: Arc<Fetcher>,
    store: Arc<dyn StorageBackend>,
    parsers: ParserRegistry,
    tickers: TickerRegistry,
    audit: CollectionAudit,
}

impl CollectionOrchestrator {
    pub fn new(
        fetcher: Arc<Fetcher>,
        store: Arc<dyn StorageBackend>,
        parsers: ParserRegistry,
        tickers: TickerRegistry,
    ) -> Self {
        let audit = CollectionAudit::new(Arc::clone(&store));
        Self {
            fetcher,
            store,
            parsers,
            tickers,
            audit,
        }
    }

    pub fn tickers(&self) -> &TickerRegistry {
        &self.tickers
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    /// Collect one family for one ticker. Never fails; the outcome is in the
    /// returned result and in the collection log.
    #[instrument(skip(self))]
    pub async fn collect_one(&self, ticker: &str, family: MetricFamily) -> FamilyResult {
        match family.endpoint().identifier() {
            Identifier::V3Id => self.collect_v3(ticker, family).await,
            Identifier::Ticker | Identifier::V4Id => {
                self.audit
                    .run(ticker, family, |ticker| {
                        self.fetch_and_parse(family, ticker, None)
                    })
                    .await
            }
        }
    }

    /// v3 families resolve their instrument id before entering the audit
    /// wrapper and log a missing id themselves.
    async fn collect_v3(&self, ticker: &str, family: MetricFamily) -> FamilyResult {
        let started = Instant::now();
        let ticker = normalize_ticker(ticker);

        let Some(v3_id) = self.tickers.get(&ticker).and_then(|c| c.v3_id.clone()) else {
            return self
                .audit
                .record_failure(&ticker, family, MISSING_V3_ID_MESSAGE, started.elapsed())
                .await;
        };

        self.audit
            .run(&ticker, family, |ticker| {
                self.fetch_and_parse(family, ticker, Some(v3_id))
            })
            .await
    }

    async fn fetch_and_parse(
        &self,
        family: MetricFamily,
        ticker: String,
        identifier: Option<String>,
    ) -> Result<Vec<Snapshot>, CollectError> {
        let endpoint = family.endpoint();
        let identifier = match identifier {
            Some(identifier) => identifier,
            None => self.resolve_identifier(&ticker, &endpoint)?,
        };
        let parser = self
            .parsers
            .get(family)
            .ok_or(CollectError::MissingParser(family))?;

        let payload = self.fetcher.fetch_endpoint(&endpoint, &identifier).await?;
        let fields = parser.parse(&payload)?;

        Ok(vec![Snapshot::new(ticker, family, fields, payload)])
    }

    fn resolve_identifier(
        &self,
        ticker: &str,
        endpoint: &Endpoint,
    ) -> Result<String, CollectError> {
        let config = self.tickers.get(ticker);
        match endpoint.identifier() {
            Identifier::Ticker => Ok(ticker.to_string()),
            Identifier::V4Id => config
                .and_then(|c| c.v4_id.clone())
                .ok_or_else(|| CollectError::Configuration(MISSING_V4_ID_MESSAGE.to_string())),
            Identifier::V3Id => config
                .and_then(|c| c.v3_id.clone())
                .ok_or_else(|| CollectError::Configuration(MISSING_V3_ID_MESSAGE.to_string())),
        }
    }

    /// Collect every family for `ticker`, sequentially in the fixed order.
    #[instrument(skip(self))]
    pub async fn collect_all_for_ticker(&self, ticker: &str) -> TickerCollection {
        let started = Instant::now();
        let ticker = normalize_ticker(ticker);

        if !is_valid_ticker(&ticker) {
            warn!("refusing to collect invalid ticker {ticker:?}");
            return TickerCollection {
                error: Some(format!("invalid ticker: {ticker:?}")),
                ticker,
                timestamp: Utc::now(),
                families: BTreeMap::new(),
                summary: TickerSummary::default(),
            };
        }

        info!("starting collection for {ticker}");

        let mut families = BTreeMap::new();
        let mut summary = TickerSummary {
            total_families: MetricFamily::ALL.len(),
            ..TickerSummary::default()
        };

        for family in MetricFamily::ALL {
            let result = self.collect_one(&ticker, family).await;
            if result.is_success() {
                summary.successful += 1;
                summary.total_records += result.records;
            } else {
                summary.failed += 1;
            }
            families.insert(family, result);
        }
        summary.duration_seconds = started.elapsed().as_secs_f64();

        info!(
            "collection for {ticker} finished: {}/{} families succeeded",
            summary.successful, summary.total_families
        );

        TickerCollection {
            ticker,
            timestamp: Utc::now(),
            error: None,
            families,
            summary,
        }
    }

    /// Collect all tracked tickers, sequentially in configuration order.
    #[instrument(skip(self))]
    pub async fn collect_all_tickers(&self) -> FleetCollection {
        let started = Instant::now();
        let mut tickers = Vec::with_capacity(self.tickers.len());
        let mut summary = FleetSummary {
            total_tickers: self.tickers.len(),
            ..FleetSummary::default()
        };

        for ticker in self.tickers.tickers() {
            let collection = self.collect_all_for_ticker(ticker).await;
            match collection.outcome() {
                TickerOutcome::FullySuccessful => summary.fully_successful += 1,
                TickerOutcome::PartiallySuccessful => summary.partially_successful += 1,
                TickerOutcome::Failed => summary.failed += 1,
            }
            summary.total_records += collection.summary.total_records;
            tickers.push(collection);
        }
        summary.duration_seconds = started.elapsed().as_secs_f64();

        info!(
            "fleet collection finished: {} ok, {} partial, {} failed, {} records",
            summary.fully_successful,
            summary.partially_successful,
            summary.failed,
            summary.total_records
        );

        FleetCollection {
            timestamp: Utc::now(),
            tickers,
            summary,
        }
    }

    pub async fn collection_summary(&self, hours_ago: i64) -> StorageResult<CollectionSummary> {
        collection_summary(self.store.as_ref(), Utc::now(), hours_ago).await
    }

    /// Overview of every configured ticker, counting alerts over `alert_hours`.
    pub async fn overview(&self, alert_hours: i64) -> StorageResult<Overview> {
        let tickers = self.tickers.tickers();
        overview(Arc::clone(&self.store), Utc::now(), tickers, alert_hours).await
    }
}

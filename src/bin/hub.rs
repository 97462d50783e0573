use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stock_monitoring::{
    MetricFamily,
    actors::{CollectionEvent, SchedulerHandle, SchedulerSettings},
    alerts::{AlertEngine, Severity},
    collection::CollectionOrchestrator,
    compare::{ComparisonEngine, DEFAULT_PERIODS},
    config::{Config, read_config_file},
    fetch::{Endpoint, Fetcher},
    parse::ParserRegistry,
    storage::{self, StorageBackend},
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "stockwatch.json")]
    file: String,

    /// Log everything down to TRACE
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,

    /// Collect once, for one ticker or every configured ticker
    Collect {
        #[arg(short, long)]
        ticker: Option<String>,
    },

    /// Compare one ticker across periods, or several tickers over one period
    Compare {
        #[arg(required = true)]
        tickers: Vec<String>,

        #[arg(long)]
        family: Option<MetricFamily>,

        /// Periods such as 1h, 1d, 1w, 1M (comma separated)
        #[arg(long, value_delimiter = ',')]
        periods: Vec<String>,
    },

    /// Scan stored snapshots for alerts
    Alerts {
        #[arg(long, default_value_t = 24)]
        hours: i64,

        #[arg(long)]
        severity: Option<Severity>,
    },

    /// Fetch one raw endpoint payload
    Fetch {
        endpoint: String,

        /// Ticker or instrument id, depending on the endpoint
        identifier: String,
    },

    /// Collection statistics from the audit log
    Summary {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Latest snapshot of every family per configured ticker, with alert counts
    Overview {
        /// Alert lookback in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("stock_monitoring", level),
        ("stockwatch_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Hub {
    config: Config,
    store: Arc<dyn StorageBackend>,
    fetcher: Arc<Fetcher>,
}

impl Hub {
    async fn new(config: Config) -> anyhow::Result<Self> {
        let store = storage::open(config.storage.as_ref())
            .await
            .context("failed to open storage")?;
        let fetcher =
            Fetcher::new(&config.fetcher, config.token()).context("failed to build fetcher")?;
        if !fetcher.has_token() {
            warn!("no Trading Central token configured; v3/v4 families will fail");
        }

        Ok(Self {
            config,
            store,
            fetcher: Arc::new(fetcher),
        })
    }

    fn orchestrator(&self) -> CollectionOrchestrator {
        CollectionOrchestrator::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.store),
            ParserRegistry::with_defaults(),
            self.config.registry(),
        )
    }

    async fn close(&self) {
        if let Err(e) = self.store.close().await {
            error!("failed to close storage: {e}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let hub = Hub::new(config).await?;

    let result = dispatch(&hub, args.command).await;
    hub.close().await;
    result
}

async fn dispatch(hub: &Hub, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run => run(hub).await,
        Command::Collect { ticker } => {
            let orchestrator = hub.orchestrator();
            match ticker {
                Some(ticker) => print_json(&orchestrator.collect_all_for_ticker(&ticker).await),
                None => print_json(&orchestrator.collect_all_tickers().await),
            }
        }
        Command::Compare {
            tickers,
            family,
            periods,
        } => compare(hub, tickers, family, periods).await,
        Command::Alerts { hours, severity } => {
            let engine = AlertEngine::new(Arc::clone(&hub.store));
            let tickers = hub.config.registry().tickers().to_vec();
            print_json(&engine.scan(&tickers, hours, severity).await)
        }
        Command::Fetch {
            endpoint,
            identifier,
        } => {
            let Some(endpoint) = Endpoint::by_name(&endpoint) else {
                bail!("unknown endpoint: {endpoint}");
            };
            let payload = hub.fetcher.fetch_endpoint(&endpoint, &identifier).await?;
            print_json(&payload)
        }
        Command::Summary { hours } => {
            let summary = hub.orchestrator().collection_summary(hours).await?;
            print_json(&summary)
        }
        Command::Overview { hours } => {
            let overview = hub.orchestrator().overview(hours).await?;
            print_json(&overview)
        }
    }
}

async fn compare(
    hub: &Hub,
    tickers: Vec<String>,
    family: Option<MetricFamily>,
    periods: Vec<String>,
) -> anyhow::Result<()> {
    let engine = ComparisonEngine::new(Arc::clone(&hub.store));
    let periods: Vec<&str> = if periods.is_empty() {
        DEFAULT_PERIODS.to_vec()
    } else {
        periods.iter().map(String::as_str).collect()
    };

    match (tickers.as_slice(), family) {
        ([ticker], Some(family)) => {
            print_json(&engine.compare_periods(ticker, family, &periods).await?)
        }
        ([ticker], None) => print_json(&engine.compare_all(ticker, &periods).await?),
        (_, Some(family)) => {
            let [period] = periods.as_slice() else {
                bail!("comparing several tickers takes exactly one period");
            };
            print_json(&engine.compare_tickers(&tickers, family, period).await?)
        }
        (_, None) => bail!("comparing several tickers requires --family"),
    }
}

/// Run the scheduler and scan for alerts after every finished run.
async fn run(hub: &Hub) -> anyhow::Result<()> {
    let settings =
        SchedulerSettings::from_config(&hub.config.scheduler, hub.config.storage.as_ref());
    info!(
        "starting scheduler for {} tickers every {}s",
        hub.config.tickers.len(),
        settings.interval.as_secs()
    );

    let (event_tx, event_rx) = broadcast::channel(16);
    let scheduler = SchedulerHandle::spawn(Arc::new(hub.orchestrator()), settings, event_tx);
    let alerts = tokio::spawn(alert_loop(AlertEngine::new(Arc::clone(&hub.store)), event_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    scheduler.shutdown().await?;
    alerts.abort();
    Ok(())
}

async fn alert_loop(engine: AlertEngine, mut events: broadcast::Receiver<CollectionEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("alert loop lagged behind by {skipped} runs");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        debug!(
            "run finished at {} with {} records",
            event.finished_at,
            event.report.total_records()
        );

        let report = engine.scan(&event.report.tickers(), 24, None).await;
        for alert in &report.alerts {
            info!("[{}] {}: {}", alert.severity, alert.ticker, alert.message);
        }
    }
}

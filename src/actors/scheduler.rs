//! SchedulerActor - periodic and manual collection runs
//!
//! ```text
//! Timer tick ──┐
//!              ├─→ Orchestrator run → retention cleanup → publish CollectionEvent
//! CollectNow ──┘
//! ```
//!
//! Commands are handled one at a time, so two collection runs never overlap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::collection::CollectionOrchestrator;
use crate::config::{MAX_INTERVAL, SchedulerConfig, StorageConfig};

use super::messages::{
    CollectionEvent, CollectionReport, RunTrigger, SchedulerCommand, SchedulerStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub run_initial: bool,
    /// Snapshots older than this many days are deleted after each run
    pub retention_days: Option<u32>,
}

impl SchedulerSettings {
    pub fn from_config(scheduler: &SchedulerConfig, storage: Option<&StorageConfig>) -> Self {
        Self {
            interval: scheduler.interval(),
            run_initial: scheduler.run_initial,
            retention_days: storage.and_then(StorageConfig::retention_days),
        }
    }
}

fn bounded_interval(interval: Duration) -> Duration {
    interval.clamp(Duration::from_secs(1), MAX_INTERVAL)
}

fn ticker_from(start: Instant, period: Duration) -> Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

pub struct SchedulerActor {
    orchestrator: Arc<CollectionOrchestrator>,
    settings: SchedulerSettings,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    event_tx: broadcast::Sender<CollectionEvent>,
    status: SchedulerStatus,
}

impl SchedulerActor {
    pub fn new(
        orchestrator: Arc<CollectionOrchestrator>,
        settings: SchedulerSettings,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        event_tx: broadcast::Sender<CollectionEvent>,
    ) -> Self {
        let mut settings = settings;
        settings.interval = bounded_interval(settings.interval);
        let status = SchedulerStatus {
            running: true,
            interval_secs: settings.interval.as_secs(),
            last_collection_time: None,
            last_collection_result: None,
            runs_completed: 0,
        };

        Self {
            orchestrator,
            settings,
            command_rx,
            event_tx,
            status,
        }
    }

    #[instrument(skip(self), fields(interval_secs = self.settings.interval.as_secs()))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        let first_tick = if self.settings.run_initial {
            Instant::now()
        } else {
            Instant::now() + self.settings.interval
        };
        let mut ticker = ticker_from(first_tick, self.settings.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect(None, RunTrigger::Scheduled).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::CollectNow { ticker: symbol, respond_to } => {
                            debug!("received CollectNow command");
                            let report = self.collect(symbol, RunTrigger::Manual).await;
                            let _ = respond_to.send(report);
                        }

                        SchedulerCommand::GetStatus { respond_to } => {
                            let _ = respond_to.send(self.status.clone());
                        }

                        SchedulerCommand::UpdateInterval { interval } => {
                            let interval = bounded_interval(interval);
                            debug!("updating interval to {}s", interval.as_secs());
                            self.settings.interval = interval;
                            self.status.interval_secs = interval.as_secs();
                            ticker = ticker_from(Instant::now() + interval, interval);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("scheduler actor stopped");
    }

    async fn collect(&mut self, ticker: Option<String>, trigger: RunTrigger) -> CollectionReport {
        info!("collection run triggered ({trigger:?})");

        let report = match ticker {
            Some(ticker) => {
                CollectionReport::Ticker(self.orchestrator.collect_all_for_ticker(&ticker).await)
            }
            None => CollectionReport::Fleet(self.orchestrator.collect_all_tickers().await),
        };

        self.apply_retention().await;

        let finished_at = Utc::now();
        self.status.last_collection_time = Some(finished_at);
        self.status.last_collection_result = Some(report.clone());
        self.status.runs_completed += 1;

        let event = CollectionEvent {
            trigger,
            report: report.clone(),
            finished_at,
        };
        match self.event_tx.send(event) {
            Ok(receivers) => trace!("published collection event to {receivers} receivers"),
            Err(_) => trace!("no receivers for collection event"),
        }

        report
    }

    async fn apply_retention(&self) {
        let Some(days) = self.settings.retention_days else {
            return;
        };

        let cutoff = TimeDelta::try_days(i64::from(days))
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            warn!("retention of {days} days reaches past the supported time range, skipping");
            return;
        };
        match self.orchestrator.store().cleanup_old_snapshots(cutoff).await {
            Ok(0) => {}
            Ok(deleted) => info!("retention removed {deleted} snapshots older than {days} days"),
            Err(e) => error!("retention cleanup failed: {e}"),
        }
    }
}

/// Handle for controlling a running [`SchedulerActor`]
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn spawn(
        orchestrator: Arc<CollectionOrchestrator>,
        settings: SchedulerSettings,
        event_tx: broadcast::Sender<CollectionEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = SchedulerActor::new(orchestrator, settings, cmd_rx, event_tx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a collection now and wait for its report.
    pub async fn collect_now(&self, ticker: Option<String>) -> Result<CollectionReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::CollectNow {
                ticker,
                respond_to: tx,
            })
            .await
            .context("failed to send CollectNow command")?;

        rx.await.context("failed to receive collection report")
    }

    pub async fn status(&self) -> Result<SchedulerStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetStatus { respond_to: tx })
            .await
            .context("failed to send GetStatus command")?;

        rx.await.context("failed to receive scheduler status")
    }

    pub async fn update_interval(&self, interval: Duration) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

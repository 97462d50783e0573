//! Message types for the scheduler actor
//!
//! Commands travel over an mpsc channel into the actor, finished runs are
//! published on a broadcast channel, and queries answer through oneshot
//! channels.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::collection::{FleetCollection, TickerCollection};

/// Result of one collection run: a single ticker or the whole fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectionReport {
    Ticker(TickerCollection),
    Fleet(FleetCollection),
}

impl CollectionReport {
    /// Tickers touched by this run.
    pub fn tickers(&self) -> Vec<String> {
        match self {
            CollectionReport::Ticker(collection) => vec![collection.ticker.clone()],
            CollectionReport::Fleet(fleet) => {
                fleet.tickers.iter().map(|c| c.ticker.clone()).collect()
            }
        }
    }

    pub fn total_records(&self) -> usize {
        match self {
            CollectionReport::Ticker(collection) => collection.summary.total_records,
            CollectionReport::Fleet(fleet) => fleet.summary.total_records,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

/// Published after every finished collection run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionEvent {
    pub trigger: RunTrigger,
    pub report: CollectionReport,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot of the scheduler's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub last_collection_time: Option<DateTime<Utc>>,
    pub last_collection_result: Option<CollectionReport>,
    pub runs_completed: u64,
}

/// Commands understood by the scheduler actor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a collection immediately, for one ticker or the whole fleet
    CollectNow {
        ticker: Option<String>,
        respond_to: oneshot::Sender<CollectionReport>,
    },

    GetStatus {
        respond_to: oneshot::Sender<SchedulerStatus>,
    },

    /// Replace the periodic interval; the next tick is one full interval away
    UpdateInterval { interval: Duration },

    Shutdown,
}

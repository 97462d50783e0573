//! Actor that drives collection runs
//!
//! The scheduler owns a command channel (mpsc), answers queries through
//! oneshot channels and publishes every finished run on a broadcast channel
//! so several consumers (alert scanning, logging) can subscribe.

pub mod messages;
pub mod scheduler;

pub use messages::{CollectionEvent, CollectionReport, RunTrigger, SchedulerStatus};
pub use scheduler::{SchedulerHandle, SchedulerSettings};

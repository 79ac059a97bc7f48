//! Beacon: reminder scheduling and notification dispatch.
//!
//! Watches a store of dated tasks and notes, arms tiered reminder timers
//! ahead of each due instant, and delivers reminders through a primary
//! notification surface or an in-process fallback channel.
//!
//! # Architecture
//!
//! - **Store**: change feed and point-in-time queries via [`store::ItemStore`]
//! - **Registry**: at most one schedule per item, keyed by [`ScheduleKey`]
//! - **Timers**: cancellable tokio timers driven by an injected [`clock::Clock`]
//! - **Feed driver**: applies changes in order, resubscribes with backoff
//! - **Catch-up sweeper**: reconciles schedules on start and resume
//! - **Dispatcher**: primary surface first, fallback channel otherwise

pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod item;
pub mod notify;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::EngineConfig;
pub use engine::{InitStatus, ReminderEngine};
pub use error::{ReminderError, Result};
pub use item::{ItemKind, ItemRecord, ReminderItem, ScheduleKey};

//! Catch-up sweeper.
//!
//! Re-queries every pending item and reconciles the registry against it.
//! Runs on engine start, on resume signals and after the change feed
//! reconnects; never on a fixed interval.

use crate::item::{ReminderItem, ScheduleKey};
use crate::scheduler::item_scheduler::{ItemScheduler, Transition};
use crate::store::{ItemQuery, ItemStore};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pending items returned by the store.
    pub scanned: usize,
    /// Items that got a new or replaced schedule.
    pub scheduled: usize,
    /// Unchanged schedules whose surviving tiers were re-armed.
    pub rearmed: usize,
    /// Schedules dropped because their item is no longer pending, or
    /// because every tier is stale.
    pub pruned: usize,
}

/// Reconciles schedules against a full store query.
pub struct CatchUpSweeper {
    store: Arc<dyn ItemStore>,
    scheduler: Arc<ItemScheduler>,
}

impl CatchUpSweeper {
    /// Create a sweeper over `store`.
    pub fn new(store: Arc<dyn ItemStore>, scheduler: Arc<ItemScheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Run one sweep at `now`.
    ///
    /// # Errors
    ///
    /// Returns the store error when the pending query fails; the registry is
    /// left untouched in that case.
    pub async fn sweep(&self, now: DateTime<Utc>) -> crate::Result<SweepReport> {
        let items = self.fetch().await?;
        Ok(self.reconcile(items, now, &HashSet::new()))
    }

    /// Pending-item query for a sweep, detached from `self` so the caller
    /// can keep serving other work while it is outstanding.
    pub fn fetch(&self) -> BoxFuture<'static, crate::Result<Vec<ReminderItem>>> {
        let store = Arc::clone(&self.store);
        async move { store.query(&ItemQuery::pending()).await }.boxed()
    }

    /// Reconcile the registry against a fetched snapshot.
    ///
    /// Keys in `settled` changed on the feed after the query was issued; the
    /// snapshot may predate that change, so their schedules are left alone.
    pub fn reconcile(
        &self,
        items: Vec<ReminderItem>,
        now: DateTime<Utc>,
        settled: &HashSet<ScheduleKey>,
    ) -> SweepReport {
        let mut report = SweepReport {
            scanned: items.len(),
            ..SweepReport::default()
        };
        let mut seen: HashSet<ScheduleKey> = HashSet::with_capacity(items.len());

        for item in &items {
            if !item.is_schedulable() {
                continue;
            }
            let key = item.key();
            if settled.contains(&key) {
                debug!(key = %key, "sweep skipped item updated by the feed");
                continue;
            }
            seen.insert(key);
            match self.scheduler.reconcile(item, now) {
                Transition::Scheduled | Transition::Rescheduled => report.scheduled += 1,
                Transition::Rearmed => report.rearmed += 1,
                Transition::Cancelled => report.pruned += 1,
                Transition::Unchanged | Transition::Skipped => {}
            }
        }

        report.pruned += self
            .scheduler
            .registry()
            .retain(|key| seen.contains(key) || settled.contains(key));

        info!(
            scanned = report.scanned,
            scheduled = report.scheduled,
            rearmed = report.rearmed,
            pruned = report.pruned,
            "catch-up sweep finished"
        );
        report
    }
}

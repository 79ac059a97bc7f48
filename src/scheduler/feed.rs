//! Change feed subscriber.
//!
//! A single driver task owns the feed subscription and applies events in
//! arrival order. Sweeps and flushes are served on the same task, so every
//! registry mutation is serialized without per-key locks.
//!
//! When the feed ends or cannot be opened the driver resubscribes with
//! doubling backoff, then runs a catch-up sweep because events may have been
//! missed in between.
//!
//! A sweep's store query runs alongside feed handling: events keep applying
//! while it is outstanding, and keys they touch are left out of the
//! reconciliation. Sweep requests arriving meanwhile share one follow-up
//! sweep.

use crate::config::FeedConfig;
use crate::error::ReminderError;
use crate::item::{ReminderItem, ScheduleKey};
use crate::scheduler::item_scheduler::ItemScheduler;
use crate::scheduler::sweep::{CatchUpSweeper, SweepReport};
use crate::store::{ChangeStream, ItemQuery, ItemStore};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work queued for the driver task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Run a catch-up sweep, optionally reporting the result.
    Sweep {
        /// Receives the sweep outcome.
        reply: Option<oneshot::Sender<crate::Result<SweepReport>>>,
    },
    /// Acknowledge once every feed event queued so far has been applied.
    Flush(oneshot::Sender<()>),
}

/// Doubling delay between resubscription attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Start at `initial`, never exceeding `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Build from the feed configuration.
    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Delay to wait now; doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay after a successful subscription.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Coalescing trigger for catch-up sweeps from external resume signals.
///
/// Signals arriving while a sweep is already queued collapse into it.
#[derive(Clone)]
pub struct ResumeHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
    pending: Arc<AtomicBool>,
}

impl ResumeHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineCommand>, pending: Arc<AtomicBool>) -> Self {
        Self { tx, pending }
    }

    /// The host regained foreground, focus or power.
    ///
    /// Returns `false` when the engine is no longer running.
    pub fn signal(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            debug!("resume signal coalesced into queued sweep");
            return !self.tx.is_closed();
        }
        if self.tx.send(EngineCommand::Sweep { reply: None }).is_err() {
            self.pending.store(false, Ordering::Release);
            return false;
        }
        true
    }
}

/// Driver task applying change feed events to the schedule.
pub struct ChangeFeedSubscriber {
    store: Arc<dyn ItemStore>,
    scheduler: Arc<ItemScheduler>,
    sweeper: Arc<CatchUpSweeper>,
    backoff: Backoff,
    resume_pending: Arc<AtomicBool>,
}

impl ChangeFeedSubscriber {
    /// Create a subscriber.
    pub fn new(
        store: Arc<dyn ItemStore>,
        scheduler: Arc<ItemScheduler>,
        sweeper: Arc<CatchUpSweeper>,
        backoff: Backoff,
        resume_pending: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            scheduler,
            sweeper,
            backoff,
            resume_pending,
        }
    }

    /// Run until `cancel` fires or every command sender is dropped.
    ///
    /// `initial` is an already-open subscription; when `None` the driver
    /// subscribes itself and sweeps once connected.
    pub async fn run(
        mut self,
        initial: Option<ChangeStream>,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        cancel: CancellationToken,
    ) {
        let mut resync = initial.is_none();
        let mut feed = initial;
        let mut retry_at: Option<Instant> = None;
        let mut in_flight: Option<PendingSweep> = None;
        let mut queued: Option<Vec<SweepReply>> = None;
        let query = ItemQuery::pending();

        loop {
            if feed.is_none() && retry_at.is_none() {
                let subscribed = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    subscribed = self.store.subscribe(&query) => subscribed,
                };
                match subscribed {
                    Ok(stream) => {
                        info!("change feed subscribed");
                        feed = Some(stream);
                        self.backoff.reset();
                        if resync {
                            resync = false;
                            if queued.is_none() {
                                queued = Some(Vec::new());
                            }
                        }
                    }
                    Err(e) => {
                        let delay = self.backoff.next_delay();
                        warn!(
                            retry_in_ms = delay.as_millis() as u64,
                            "change feed subscribe failed: {e}"
                        );
                        retry_at = Some(Instant::now() + delay);
                    }
                }
            }

            if in_flight.is_none()
                && let Some(replies) = queued.take()
            {
                in_flight = Some(self.start_sweep(replies));
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = next_event(feed.as_mut()), if feed.is_some() => match event {
                    Some(event) => {
                        if let Some(sweep) = in_flight.as_mut() {
                            sweep.settled.insert(event.item.key());
                        }
                        self.scheduler.apply(&event);
                    }
                    None => {
                        warn!("change feed ended; resubscribing");
                        feed = None;
                        resync = true;
                        let delay = self.backoff.next_delay();
                        retry_at = Some(Instant::now() + delay);
                    }
                },
                fetched = fetch_result(in_flight.as_mut()), if in_flight.is_some() => {
                    if let Some(sweep) = in_flight.take() {
                        self.finish_sweep(sweep, fetched);
                    }
                }
                () = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    retry_at = None;
                }
                command = commands.recv() => match command {
                    Some(EngineCommand::Sweep { reply }) => {
                        let replies = queued.get_or_insert_with(Vec::new);
                        replies.extend(reply);
                    }
                    Some(EngineCommand::Flush(ack)) => {
                        let _ = ack.send(());
                    }
                    None => break,
                },
            }
        }

        if in_flight.is_some() {
            debug!("abandoning in-flight catch-up sweep");
        }
        debug!("change feed subscriber stopped");
    }

    fn start_sweep(&self, replies: Vec<SweepReply>) -> PendingSweep {
        self.resume_pending.store(false, Ordering::Release);
        PendingSweep {
            fetch: self.sweeper.fetch(),
            settled: HashSet::new(),
            replies,
        }
    }

    fn finish_sweep(&self, sweep: PendingSweep, fetched: crate::Result<Vec<ReminderItem>>) {
        let mut replies = sweep.replies;
        match fetched {
            Ok(items) => {
                let report = self
                    .sweeper
                    .reconcile(items, self.scheduler.now(), &sweep.settled);
                for reply in replies {
                    let _ = reply.send(Ok(report));
                }
            }
            Err(e) => {
                warn!("catch-up sweep failed: {e}");
                let last = replies.pop();
                for reply in replies {
                    let _ = reply.send(Err(ReminderError::Scheduler(format!(
                        "catch-up sweep failed: {e}"
                    ))));
                }
                if let Some(reply) = last {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }
}

type SweepReply = oneshot::Sender<crate::Result<SweepReport>>;

/// A catch-up sweep whose store query is still outstanding.
struct PendingSweep {
    fetch: BoxFuture<'static, crate::Result<Vec<ReminderItem>>>,
    /// Keys the feed touched since the query was issued.
    settled: HashSet<ScheduleKey>,
    replies: Vec<SweepReply>,
}

async fn fetch_result(sweep: Option<&mut PendingSweep>) -> crate::Result<Vec<ReminderItem>> {
    match sweep {
        Some(sweep) => (&mut sweep.fetch).await,
        None => std::future::pending().await,
    }
}

async fn next_event(feed: Option<&mut ChangeStream>) -> Option<crate::store::ChangeEvent> {
    match feed {
        Some(stream) => stream.next().await,
        None => None,
    }
}

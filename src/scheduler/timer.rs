//! Delayed callbacks with explicit cancel handles.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Cancel handle for one armed timer.
///
/// Cancelling is idempotent and safe after the timer has fired.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    /// Process-unique identifier of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Disarm the timer. No-op if it already fired or was cancelled.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Arms tokio-backed timers relative to an injected [`Clock`].
#[derive(Clone)]
pub struct TimerScheduler {
    clock: Arc<dyn Clock>,
    root: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl TimerScheduler {
    /// Create a scheduler reading "now" from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            root: CancellationToken::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The clock used for delay computation.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current instant according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `fire` at `trigger_at`.
    ///
    /// A trigger instant in the past is scheduled with zero delay. Must be
    /// called from within a tokio runtime.
    pub fn arm<F>(&self, trigger_at: DateTime<Utc>, fire: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let delay = self.delay_until(trigger_at);

        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_token.cancelled() => {
                    trace!(timer = id, "timer cancelled before firing");
                }
                () = tokio::time::sleep(delay) => {
                    if task_token.is_cancelled() {
                        return;
                    }
                    fire.await;
                }
            }
        });

        TimerHandle { id, token }
    }

    /// Idempotent cancellation, equivalent to [`TimerHandle::cancel`].
    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }

    /// Disarm every timer this scheduler ever armed.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Whether [`cancel_all`](Self::cancel_all) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    fn delay_until(&self, trigger_at: DateTime<Utc>) -> Duration {
        trigger_at
            .signed_duration_since(self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

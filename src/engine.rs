//! Reminder engine lifecycle.
//!
//! [`ReminderEngine`] wires the store, the scheduler and the dispatcher
//! together, runs the initial catch-up sweep and owns the change feed
//! driver task.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ReminderError, Result};
use crate::notify::dispatcher::NotificationDispatcher;
use crate::notify::fallback::FallbackChannel;
use crate::notify::surface::{NotificationSurface, Permission};
use crate::scheduler::feed::{Backoff, ChangeFeedSubscriber, EngineCommand, ResumeHandle};
use crate::scheduler::item_scheduler::ItemScheduler;
use crate::scheduler::registry::DedupRegistry;
use crate::scheduler::sweep::{CatchUpSweeper, SweepReport};
use crate::scheduler::tiers::Tier;
use crate::scheduler::timer::TimerScheduler;
use crate::store::{ItemQuery, ItemStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of [`ReminderEngine::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitStatus {
    /// Permission reported by the primary surface. Anything but `Granted`
    /// means reminders go to the fallback channel.
    pub permission: Permission,
    /// Report of the initial sweep; `None` when it was deferred to the
    /// driver because the store was unreachable.
    pub swept: Option<SweepReport>,
}

enum Lifecycle {
    Idle(mpsc::UnboundedReceiver<EngineCommand>),
    Starting,
    Running(JoinHandle<()>),
    Stopped,
}

struct Components {
    dispatcher: Arc<NotificationDispatcher>,
    scheduler: Arc<ItemScheduler>,
    sweeper: Arc<CatchUpSweeper>,
}

/// Reminder scheduling and notification engine.
pub struct ReminderEngine {
    config: EngineConfig,
    store: Arc<dyn ItemStore>,
    surface: Arc<dyn NotificationSurface>,
    fallback: FallbackChannel,
    clock: Arc<dyn Clock>,
    tiers: Vec<Tier>,
    registry: Arc<DedupRegistry>,
    parts: Components,
    commands: mpsc::UnboundedSender<EngineCommand>,
    resume_pending: Arc<AtomicBool>,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl ReminderEngine {
    /// Build an engine over `store`, delivering through `surface`.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Config`] when the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ItemStore>,
        surface: Arc<dyn NotificationSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let tiers = config.tiers()?;
        let fallback = FallbackChannel::new(config.dispatch.fallback_capacity);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(DedupRegistry::new());
        let parts = assemble(
            &config,
            &store,
            &surface,
            &fallback,
            &clock,
            &tiers,
            &registry,
        );
        let (commands, rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            store,
            surface,
            fallback,
            clock,
            tiers,
            registry,
            parts,
            commands,
            resume_pending: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::Idle(rx)),
        })
    }

    /// Replace the wall clock used for trigger computation and timer delays.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebuild();
        self
    }

    /// Emit fallback notices on an existing channel.
    pub fn with_fallback(mut self, fallback: FallbackChannel) -> Self {
        self.fallback = fallback;
        self.rebuild();
        self
    }

    fn rebuild(&mut self) {
        self.parts = assemble(
            &self.config,
            &self.store,
            &self.surface,
            &self.fallback,
            &self.clock,
            &self.tiers,
            &self.registry,
        );
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Request notification permission, subscribe to the change feed, run
    /// the first catch-up sweep and start the driver task.
    ///
    /// Permission refusal is not an error: it is reported in the returned
    /// status and reminders are delivered on the fallback channel.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Scheduler`] when the engine was already
    /// initialized or has been shut down.
    pub async fn initialize(&self) -> Result<InitStatus> {
        let commands = {
            let mut lifecycle = self.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Starting) {
                Lifecycle::Idle(rx) => rx,
                other => {
                    let state = match &other {
                        Lifecycle::Stopped => "shut down",
                        _ => "already initialized",
                    };
                    *lifecycle = other;
                    return Err(ReminderError::Scheduler(format!("engine is {state}")));
                }
            }
        };

        let permission = self.parts.dispatcher.request_permission().await;
        match permission {
            Permission::Granted => info!("notification permission granted"),
            Permission::Denied => {
                warn!("notification permission denied; reminders will use the fallback channel");
            }
            Permission::Unavailable => {
                warn!("notification surface unavailable; reminders will use the fallback channel");
            }
        }

        let feed = match self.store.subscribe(&ItemQuery::pending()).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("initial change feed subscription failed: {e}");
                None
            }
        };

        let swept = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = self.parts.sweeper.sweep(self.clock.now()) => match result {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("initial catch-up sweep failed: {e}");
                    None
                }
            },
        };
        if swept.is_none() && feed.is_some() {
            let _ = self.commands.send(EngineCommand::Sweep { reply: None });
        }

        let subscriber = ChangeFeedSubscriber::new(
            Arc::clone(&self.store),
            Arc::clone(&self.parts.scheduler),
            Arc::clone(&self.parts.sweeper),
            Backoff::from_config(&self.config.feed),
            Arc::clone(&self.resume_pending),
        );
        let driver = tokio::spawn(subscriber.run(feed, commands, self.cancel.clone()));

        {
            let mut lifecycle = self.lock();
            if self.cancel.is_cancelled() {
                *lifecycle = Lifecycle::Stopped;
                drop(lifecycle);
                driver.abort();
                self.parts.scheduler.timers().cancel_all();
                self.registry.clear();
                return Err(ReminderError::Scheduler(
                    "engine shut down during initialization".to_owned(),
                ));
            }
            *lifecycle = Lifecycle::Running(driver);
        }

        info!(
            permission = %permission,
            tracked = self.registry.len(),
            "reminder engine started"
        );
        Ok(InitStatus { permission, swept })
    }

    /// Handle that schedules a catch-up sweep when the host resumes.
    pub fn resume_handle(&self) -> ResumeHandle {
        ResumeHandle::new(self.commands.clone(), Arc::clone(&self.resume_pending))
    }

    /// Run a catch-up sweep on the driver task and wait for its report.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Scheduler`] when the engine is not running,
    /// or the store error when the sweep query fails.
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        self.ensure_running()?;
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Sweep { reply: Some(tx) })
            .map_err(|_| ReminderError::Channel("engine driver stopped".to_owned()))?;
        rx.await
            .map_err(|_| ReminderError::Channel("engine driver dropped sweep reply".to_owned()))?
    }

    /// Wait until the driver has applied every change event delivered
    /// before this call.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine is not running.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_running()?;
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Flush(tx))
            .map_err(|_| ReminderError::Channel("engine driver stopped".to_owned()))?;
        rx.await
            .map_err(|_| ReminderError::Channel("engine driver dropped flush ack".to_owned()))
    }

    fn ensure_running(&self) -> Result<()> {
        match &*self.lock() {
            Lifecycle::Running(_) => Ok(()),
            Lifecycle::Stopped => Err(ReminderError::Scheduler("engine is shut down".to_owned())),
            Lifecycle::Idle(_) | Lifecycle::Starting => Err(ReminderError::Scheduler(
                "engine is not initialized".to_owned(),
            )),
        }
    }

    /// Whether the driver task is running.
    pub fn is_running(&self) -> bool {
        matches!(&*self.lock(), Lifecycle::Running(_))
    }

    /// Channel carrying reminders the primary surface could not show.
    pub fn fallback(&self) -> &FallbackChannel {
        &self.fallback
    }

    /// The dispatcher, for test notifications and delivery history.
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.parts.dispatcher
    }

    /// The dedup registry, for inspection.
    pub fn registry(&self) -> &Arc<DedupRegistry> {
        &self.registry
    }

    /// Current wall-clock instant as seen by the engine.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Effective tiers, ordered by descending lead time.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Stop the driver, disarm every timer and forget all schedules.
    ///
    /// Safe to call before [`initialize`](Self::initialize) and more than
    /// once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.parts.scheduler.timers().cancel_all();

        let driver = {
            let mut lifecycle = self.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(driver) => Some(driver),
                Lifecycle::Starting => {
                    *lifecycle = Lifecycle::Starting;
                    None
                }
                Lifecycle::Idle(_) | Lifecycle::Stopped => None,
            }
        };

        if let Some(driver) = driver
            && let Err(e) = driver.await
        {
            warn!("engine driver task ended abnormally: {e}");
        }

        let dropped = self.registry.len();
        self.registry.clear();
        if dropped > 0 {
            info!(dropped, "reminder engine stopped");
        }
    }
}

fn assemble(
    config: &EngineConfig,
    store: &Arc<dyn ItemStore>,
    surface: &Arc<dyn NotificationSurface>,
    fallback: &FallbackChannel,
    clock: &Arc<dyn Clock>,
    tiers: &[Tier],
    registry: &Arc<DedupRegistry>,
) -> Components {
    let dispatcher = Arc::new(
        NotificationDispatcher::new(Arc::clone(surface), fallback.clone(), Arc::clone(clock))
            .with_history_limit(config.dispatch.history_limit),
    );
    let scheduler = Arc::new(ItemScheduler::new(
        Arc::clone(registry),
        TimerScheduler::new(Arc::clone(clock)),
        Arc::clone(&dispatcher),
        tiers.to_vec(),
        config.catch_up.grace(),
    ));
    let sweeper = Arc::new(CatchUpSweeper::new(
        Arc::clone(store),
        Arc::clone(&scheduler),
    ));
    Components {
        dispatcher,
        scheduler,
        sweeper,
    }
}

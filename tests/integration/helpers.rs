//! Shared helpers for integration tests.

use async_trait::async_trait;
use beacon::clock::{Clock, TokioClock};
use beacon::notify::{Notification, NotificationSurface, Permission};
use beacon::store::MemoryItemStore;
use beacon::{EngineConfig, ReminderEngine};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Wall-clock instant every simulated timeline starts at.
pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 3, 8, 0, 0).unwrap()
}

/// Surface that records what it was asked to show.
pub(crate) struct TestSurface {
    permission: Permission,
    shown: Mutex<Vec<Notification>>,
    hang_on: Mutex<Option<String>>,
}

impl TestSurface {
    pub(crate) fn new(permission: Permission) -> Arc<Self> {
        Arc::new(Self {
            permission,
            shown: Mutex::new(Vec::new()),
            hang_on: Mutex::new(None),
        })
    }

    /// Never return from `show` for notifications whose title contains `needle`.
    pub(crate) fn hang_on(&self, needle: &str) {
        *self.hang_on.lock().unwrap() = Some(needle.to_owned());
    }

    pub(crate) fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }

    pub(crate) fn tags(&self) -> Vec<String> {
        self.shown().into_iter().map(|n| n.tag).collect()
    }
}

#[async_trait]
impl NotificationSurface for TestSurface {
    fn permission(&self) -> Permission {
        self.permission
    }

    async fn request_permission(&self) -> beacon::Result<Permission> {
        Ok(self.permission)
    }

    async fn show(&self, notification: &Notification) -> beacon::Result<()> {
        let hangs = self
            .hang_on
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| notification.title.contains(needle));
        if hangs {
            std::future::pending::<()>().await;
        }
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Engine over a memory store, on a paused tokio clock anchored at [`start`].
pub(crate) struct Harness {
    pub(crate) store: Arc<MemoryItemStore>,
    pub(crate) surface: Arc<TestSurface>,
    pub(crate) engine: ReminderEngine,
    clock: Arc<TokioClock>,
}

impl Harness {
    pub(crate) fn new(store: MemoryItemStore, permission: Permission) -> Self {
        Self::with_config(store, permission, EngineConfig::default())
    }

    pub(crate) fn with_config(
        store: MemoryItemStore,
        permission: Permission,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(store);
        let surface = TestSurface::new(permission);
        let clock = Arc::new(TokioClock::starting_at(start()));
        let engine = ReminderEngine::new(config, store.clone(), surface.clone())
            .unwrap()
            .with_clock(clock.clone());
        Self {
            store,
            surface,
            engine,
            clock,
        }
    }

    /// Wall-clock "now" on the simulated timeline.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Let spawned timer tasks run without moving the paused clock far.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

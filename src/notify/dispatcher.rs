//! Notification dispatcher.
//!
//! Renders a reminder for one fired tier and delivers it through the
//! primary [`NotificationSurface`], or through the [`FallbackChannel`] when
//! the surface is denied, unavailable or failing. Dispatch never returns an
//! error to its caller and never touches other armed timers.

use crate::clock::Clock;
use crate::item::{ReminderItem, ScheduleKey};
use crate::notify::fallback::{FallbackChannel, Severity};
use crate::notify::surface::{Notification, NotificationSurface, Permission};
use crate::scheduler::tiers::Tier;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Number of dispatch records kept by default.
const DEFAULT_HISTORY_LIMIT: usize = 400;

/// Tag used for manual test notifications.
pub const TEST_TAG: &str = "test";

/// Why a reminder went to the fallback channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The surface reports permission denied.
    PermissionDenied,
    /// The surface does not exist or cannot be queried.
    Unavailable,
    /// The surface accepted the request but failed to show it.
    SurfaceError(String),
}

/// Where a reminder was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum DispatchRoute {
    /// Shown on the primary surface.
    Primary,
    /// Emitted on the fallback channel.
    Fallback(FallbackReason),
}

impl DispatchRoute {
    /// Whether the fallback channel was used.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// One delivered reminder.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    /// Item key; `None` for test notifications.
    pub key: Option<ScheduleKey>,
    /// Tier label or [`TEST_TAG`].
    pub tier: String,
    /// Rendered notification.
    pub notification: Notification,
    /// Delivery route.
    pub route: DispatchRoute,
    /// When dispatch happened.
    pub dispatched_at: DateTime<Utc>,
}

/// Delivers reminders to the primary surface or the fallback channel.
pub struct NotificationDispatcher {
    surface: Arc<dyn NotificationSurface>,
    fallback: FallbackChannel,
    clock: Arc<dyn Clock>,
    history: Mutex<VecDeque<DispatchRecord>>,
    history_limit: usize,
}

impl NotificationDispatcher {
    /// Create a dispatcher over `surface` with `fallback` as secondary channel.
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        fallback: FallbackChannel,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            surface,
            fallback,
            clock,
            history: Mutex::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Override the in-memory history limit.
    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.history_limit = max_entries.max(1);
        self
    }

    /// The fallback channel reminders are emitted on.
    pub fn fallback(&self) -> &FallbackChannel {
        &self.fallback
    }

    /// Ask the surface for permission. Errors count as [`Permission::Unavailable`].
    pub async fn request_permission(&self) -> Permission {
        match self.surface.request_permission().await {
            Ok(permission) => permission,
            Err(e) => {
                warn!("notification permission request failed: {e}");
                Permission::Unavailable
            }
        }
    }

    /// Render the notification for `item` at `tier`.
    pub fn render(item: &ReminderItem, tier: &Tier) -> Notification {
        let when = item
            .due
            .map(|due| format!(" ({})", format_due(due)))
            .unwrap_or_default();
        Notification {
            title: format!("{} Reminder: {}", item.kind.title_case(), item.title),
            body: format!("This {} is due {}{when}", item.kind, tier.describe_lead()),
            tag: tier.label().to_owned(),
        }
    }

    /// Deliver the reminder for one fired tier.
    pub async fn dispatch(&self, item: &ReminderItem, tier: &Tier) -> DispatchRoute {
        let notification = Self::render(item, tier);
        info!(key = %item.key(), tier = tier.label(), "dispatching reminder");
        let route = self.deliver(&notification).await;
        self.record(Some(item.key()), tier.label(), notification, route.clone());
        route
    }

    /// Send a one-off test notification through the normal routing.
    pub async fn dispatch_test(&self) -> DispatchRoute {
        let notification = Notification {
            title: "Test Reminder".to_owned(),
            body: format!("This is a test reminder at {}", format_due(self.clock.now())),
            tag: TEST_TAG.to_owned(),
        };
        let route = self.deliver(&notification).await;
        self.record(None, TEST_TAG, notification, route.clone());
        route
    }

    async fn deliver(&self, notification: &Notification) -> DispatchRoute {
        match self.surface.permission() {
            Permission::Granted => {}
            Permission::Denied => {
                debug!("notification permission denied; using fallback channel");
                self.fallback.emit(notification.as_line(), Severity::Info);
                return DispatchRoute::Fallback(FallbackReason::PermissionDenied);
            }
            Permission::Unavailable => {
                debug!("notification surface unavailable; using fallback channel");
                self.fallback.emit(notification.as_line(), Severity::Info);
                return DispatchRoute::Fallback(FallbackReason::Unavailable);
            }
        }

        match self.surface.show(notification).await {
            Ok(()) => DispatchRoute::Primary,
            Err(e) => {
                warn!(tag = %notification.tag, "notification surface failed: {e}");
                self.fallback
                    .emit(notification.as_line(), Severity::Warning);
                self.fallback
                    .emit(format!("Notification failed: {e}"), Severity::Error);
                DispatchRoute::Fallback(FallbackReason::SurfaceError(e.to_string()))
            }
        }
    }

    fn record(
        &self,
        key: Option<ScheduleKey>,
        tier: &str,
        notification: Notification,
        route: DispatchRoute,
    ) {
        let record = DispatchRecord {
            key,
            tier: tier.to_owned(),
            notification,
            route,
            dispatched_at: self.clock.now(),
        };
        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.push_back(record);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Recent dispatches, oldest first.
    pub fn history(&self) -> Vec<DispatchRecord> {
        match self.history.lock() {
            Ok(history) => history.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Number of recorded dispatches for `key`.
    pub fn dispatch_count(&self, key: &ScheduleKey) -> usize {
        self.history()
            .iter()
            .filter(|r| r.key.as_ref() == Some(key))
            .count()
    }
}

fn format_due(due: DateTime<Utc>) -> String {
    due.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

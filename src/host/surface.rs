//! Primary surface that forwards notifications to the host as events.

use crate::host::contract::EventEnvelope;
use crate::notify::surface::{Notification, NotificationSurface, Permission};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event name for notifications shown on the host surface.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Notification surface backed by the bridge's output stream.
pub struct HostSurface {
    permission: Permission,
    events: mpsc::UnboundedSender<EventEnvelope>,
}

impl HostSurface {
    /// `enabled` maps to `Granted`, otherwise `Denied`.
    pub fn new(enabled: bool, events: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        let permission = if enabled {
            Permission::Granted
        } else {
            Permission::Denied
        };
        Self {
            permission,
            events,
        }
    }
}

#[async_trait]
impl NotificationSurface for HostSurface {
    fn permission(&self) -> Permission {
        self.permission
    }

    async fn request_permission(&self) -> crate::Result<Permission> {
        Ok(self.permission)
    }

    async fn show(&self, notification: &Notification) -> crate::Result<()> {
        let payload = serde_json::to_value(notification)
            .map_err(|e| crate::ReminderError::Notification(e.to_string()))?;
        self.events
            .send(EventEnvelope::new(NOTIFICATION_EVENT, payload))
            .map_err(|_| crate::ReminderError::Notification("host output closed".to_owned()))
    }
}

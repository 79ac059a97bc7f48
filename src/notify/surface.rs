//! Primary notification surface contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission state reported by a notification surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// The surface may show notifications.
    Granted,
    /// The user refused notifications.
    Denied,
    /// No surface exists, or it could not be queried.
    Unavailable,
}

impl Permission {
    /// Whether notifications can be shown on the primary surface.
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => f.write_str("granted"),
            Self::Denied => f.write_str("denied"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A rendered, human-visible reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Detail line.
    pub body: String,
    /// Replacement tag; the tier label for reminders.
    pub tag: String,
}

impl Notification {
    /// Single-line form used by the fallback channel.
    pub fn as_line(&self) -> String {
        format!("{} - {}", self.title, self.body)
    }
}

/// OS- or browser-level notification mechanism.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Current permission without prompting.
    fn permission(&self) -> Permission;

    /// Ask the user for permission.
    async fn request_permission(&self) -> crate::Result<Permission>;

    /// Show a notification.
    async fn show(&self, notification: &Notification) -> crate::Result<()>;
}

/// Surface for hosts without a notification mechanism; everything falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSurface;

#[async_trait]
impl NotificationSurface for NoSurface {
    fn permission(&self) -> Permission {
        Permission::Unavailable
    }

    async fn request_permission(&self) -> crate::Result<Permission> {
        Ok(Permission::Unavailable)
    }

    async fn show(&self, _notification: &Notification) -> crate::Result<()> {
        Err(crate::ReminderError::Notification(
            "no notification surface available".to_owned(),
        ))
    }
}

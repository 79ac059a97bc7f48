//! In-process fallback channel.
//!
//! When the primary surface cannot show a reminder, the dispatcher emits a
//! [`FallbackNotice`] here instead. UI code subscribes and renders it as a
//! banner or snackbar. With no subscriber the notice is dropped, which is
//! the only fully silent delivery mode.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Severity of a fallback notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Regular reminder.
    Info,
    /// Reminder delivered here because the primary surface failed.
    Warning,
    /// Delivery problem worth the user's attention.
    Error,
}

/// A message for the in-process UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackNotice {
    /// Text to display.
    pub message: String,
    /// Display severity.
    pub severity: Severity,
}

/// Broadcast-backed fallback channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FallbackChannel {
    tx: broadcast::Sender<FallbackNotice>,
}

impl FallbackChannel {
    /// Create a channel buffering up to `capacity` notices per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit a notice. Returns the number of subscribers that received it.
    pub fn emit(&self, message: impl Into<String>, severity: Severity) -> usize {
        let notice = FallbackNotice {
            message: message.into(),
            severity,
        };
        match self.tx.send(notice) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("fallback notice dropped; no listener");
                0
            }
        }
    }

    /// Subscribe to future notices.
    pub fn subscribe(&self) -> broadcast::Receiver<FallbackNotice> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FallbackChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

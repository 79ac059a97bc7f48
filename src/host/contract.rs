//! Versioned command, response and event envelopes for the host bridge.

use crate::item::{ItemKind, ItemRecord};
use serde::{Deserialize, Serialize};

/// Contract version for host envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Longest lead accepted for a scheduled test reminder.
pub const MAX_TEST_LEAD_SECS: u64 = 24 * 60 * 60;

fn current_version() -> u32 {
    EVENT_VERSION
}

/// Command issued by the host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    /// Insert or replace an item.
    Upsert { item: ItemRecord },
    /// Mark an item completed.
    Complete { kind: ItemKind, id: String },
    /// Delete an item.
    Remove { kind: ItemKind, id: String },
    /// The host regained foreground or focus.
    Resume,
    /// Send a test notification now and, with `schedule_in_secs`, also
    /// schedule a test task due that far ahead through the normal path.
    Test {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule_in_secs: Option<u64>,
    },
    /// Stop the engine and exit the bridge.
    Shutdown,
}

impl HostCommand {
    /// Wire name of the command.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert { .. } => "upsert",
            Self::Complete { .. } => "complete",
            Self::Remove { .. } => "remove",
            Self::Resume => "resume",
            Self::Test { .. } => "test",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A command line read from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default = "current_version")]
    pub v: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub command: HostCommand,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(command: HostCommand) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: None,
            command,
        }
    }

    /// Reject envelopes from a different contract version.
    pub fn validate(&self) -> crate::Result<()> {
        if self.v != EVENT_VERSION {
            return Err(crate::ReminderError::Channel(format!(
                "unsupported contract version {}; expected {EVENT_VERSION}",
                self.v
            )));
        }
        if let HostCommand::Test {
            schedule_in_secs: Some(secs),
        } = self.command
            && secs > MAX_TEST_LEAD_SECS
        {
            return Err(crate::ReminderError::Channel(format!(
                "schedule_in_secs {secs} exceeds {MAX_TEST_LEAD_SECS}"
            )));
        }
        Ok(())
    }
}

/// Reply to one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub command: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response.
    #[must_use]
    pub fn ok(
        request_id: Option<String>,
        command: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id,
            command: command.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(
        request_id: Option<String>,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id,
            command: command.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Unsolicited output: engine lifecycle, notifications, fallback notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            event: event.into(),
            payload,
        }
    }
}

/// Any line written by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputLine {
    Response(ResponseEnvelope),
    Event(EventEnvelope),
}

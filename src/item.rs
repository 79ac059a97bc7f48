//! Pending items observed by the engine.
//!
//! A [`ReminderItem`] is a task or a note that may carry a due instant. The
//! engine never mutates items; it only reacts to the store's view of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Kind of pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A task with a due time.
    Task,
    /// A note with an explicit reminder time.
    Note,
}

impl ItemKind {
    /// Capitalized name used in notification titles.
    pub fn title_case(self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Note => "Note",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Note => f.write_str("note"),
        }
    }
}

/// Identifies at most one live schedule: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleKey {
    /// Item kind.
    pub kind: ItemKind,
    /// Store identifier, unique within `kind`.
    pub id: String,
}

impl ScheduleKey {
    /// Build a key from its parts.
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// A task or note as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderItem {
    /// Store identifier.
    pub id: String,
    /// Task or note.
    pub kind: ItemKind,
    /// Display title.
    pub title: String,
    /// Instant the reminder is anchored to. `None` for notes without a reminder.
    pub due: Option<DateTime<Utc>>,
    /// Completed items never fire.
    pub completed: bool,
}

impl ReminderItem {
    /// Create an open item.
    pub fn new(
        kind: ItemKind,
        id: impl Into<String>,
        title: impl Into<String>,
        due: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            due,
            completed: false,
        }
    }

    /// Shorthand for a task due at `due`.
    pub fn task(id: impl Into<String>, title: impl Into<String>, due: DateTime<Utc>) -> Self {
        Self::new(ItemKind::Task, id, title, Some(due))
    }

    /// Shorthand for a note with a reminder at `due`.
    pub fn note(id: impl Into<String>, title: impl Into<String>, due: DateTime<Utc>) -> Self {
        Self::new(ItemKind::Note, id, title, Some(due))
    }

    /// Returns this item's schedule key.
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey::new(self.kind, self.id.clone())
    }

    /// `true` when the item is open and has a due instant.
    pub fn is_schedulable(&self) -> bool {
        !self.completed && self.due.is_some()
    }

    /// Convert a loosely-typed record into an item.
    ///
    /// An unparseable `due` is logged and treated as absent, so the item is
    /// simply not scheduled.
    pub fn from_record(record: ItemRecord) -> Self {
        let due = match record.due.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(e) => {
                    warn!(
                        kind = %record.kind,
                        id = %record.id,
                        raw_due = raw,
                        "ignoring malformed due instant: {e}"
                    );
                    None
                }
            },
        };

        Self {
            id: record.id,
            kind: record.kind,
            title: record.title,
            due,
            completed: record.completed,
        }
    }
}

/// Wire form of an item, as delivered by external stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Store identifier.
    pub id: String,
    /// Task or note.
    pub kind: ItemKind,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// RFC 3339 timestamp, if any.
    #[serde(default)]
    pub due: Option<String>,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
}

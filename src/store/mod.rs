//! Item store gateway.
//!
//! The engine never owns item data. It consumes a change feed of
//! [`ChangeEvent`]s and runs point-in-time queries for catch-up sweeps
//! through the [`ItemStore`] trait.

pub mod memory;

use crate::item::ReminderItem;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use memory::MemoryItemStore;

/// Kind of change reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The item entered the subscribed result set.
    Added,
    /// The item changed and is still in the result set.
    Modified,
    /// The item was deleted or left the result set.
    Removed,
}

/// One change feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Item state after the change (last known state for `Removed`).
    pub item: ReminderItem,
}

impl ChangeEvent {
    /// An `Added` event.
    pub fn added(item: ReminderItem) -> Self {
        Self {
            kind: ChangeKind::Added,
            item,
        }
    }

    /// A `Modified` event.
    pub fn modified(item: ReminderItem) -> Self {
        Self {
            kind: ChangeKind::Modified,
            item,
        }
    }

    /// A `Removed` event.
    pub fn removed(item: ReminderItem) -> Self {
        Self {
            kind: ChangeKind::Removed,
            item,
        }
    }
}

/// Ordered stream of change events. Ends when the subscription drops.
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

/// Predicate over items, shared by subscriptions and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuery {
    /// Include completed items.
    pub include_completed: bool,
    /// Only items with a due instant.
    pub require_due: bool,
}

impl ItemQuery {
    /// Open items with a due instant: everything that may need a reminder.
    pub fn pending() -> Self {
        Self {
            include_completed: false,
            require_due: true,
        }
    }

    /// Every item.
    pub fn all() -> Self {
        Self {
            include_completed: true,
            require_due: false,
        }
    }

    /// Whether `item` satisfies the predicate.
    pub fn matches(&self, item: &ReminderItem) -> bool {
        (self.include_completed || !item.completed) && (!self.require_due || item.due.is_some())
    }
}

/// Read-only access to pending items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Open a change feed for items matching `query`.
    ///
    /// Items entering the result set arrive as `Added`, items leaving it as
    /// `Removed`. Existing items are not replayed; callers pair a
    /// subscription with a [`query`](ItemStore::query).
    async fn subscribe(&self, query: &ItemQuery) -> crate::Result<ChangeStream>;

    /// Snapshot of the items matching `query`.
    async fn query(&self, query: &ItemQuery) -> crate::Result<Vec<ReminderItem>>;
}

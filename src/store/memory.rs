//! In-process [`ItemStore`] used by the host binary and tests.

use crate::item::{ItemKind, ReminderItem, ScheduleKey};
use crate::store::{ChangeEvent, ChangeKind, ChangeStream, ItemQuery, ItemStore};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

struct Subscriber {
    query: ItemQuery,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    items: HashMap<ScheduleKey, ReminderItem>,
    subscribers: Vec<Subscriber>,
    failing_subscribes: u32,
}

/// Item store kept in memory, with a live change feed.
pub struct MemoryItemStore {
    state: Mutex<MemoryState>,
    queries_stalled: watch::Sender<bool>,
}

impl Default for MemoryItemStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            queries_stalled: watch::channel(false).0,
        }
    }
}

impl MemoryItemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `items` (no events are emitted).
    pub fn with_items(items: impl IntoIterator<Item = ReminderItem>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for item in items {
                state.items.insert(item.key(), item);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert or replace an item and notify subscribers.
    ///
    /// Returns `Added` for a new item and `Modified` otherwise.
    pub fn upsert(&self, item: ReminderItem) -> ChangeKind {
        let mut state = self.lock();
        let previous = state.items.insert(item.key(), item.clone());
        let kind = if previous.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        publish(&mut state, previous.as_ref(), Some(&item));
        kind
    }

    /// Set the completion flag of an existing item.
    pub fn set_completed(&self, kind: ItemKind, id: &str, completed: bool) -> bool {
        let key = ScheduleKey::new(kind, id);
        let mut state = self.lock();
        let Some(current) = state.items.get(&key).cloned() else {
            return false;
        };
        let mut updated = current.clone();
        updated.completed = completed;
        state.items.insert(key, updated.clone());
        publish(&mut state, Some(&current), Some(&updated));
        true
    }

    /// Delete an item and notify subscribers.
    pub fn remove(&self, key: &ScheduleKey) -> Option<ReminderItem> {
        let mut state = self.lock();
        let removed = state.items.remove(key)?;
        publish(&mut state, Some(&removed), None);
        Some(removed)
    }

    /// Current state of one item.
    pub fn get(&self, key: &ScheduleKey) -> Option<ReminderItem> {
        self.lock().items.get(key).cloned()
    }

    /// End every live change stream.
    pub fn disconnect_subscribers(&self) {
        self.lock().subscribers.clear();
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.lock().failing_subscribes = count;
    }

    /// Hold every `query` call until stalling is switched off again.
    ///
    /// Stands in for a backend that stops answering while the change feed
    /// keeps working.
    pub fn stall_queries(&self, stalled: bool) {
        self.queries_stalled.send_replace(stalled);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|s| !s.tx.is_closed());
        state.subscribers.len()
    }
}

/// Translate one item transition into per-subscriber events, following each
/// subscriber's predicate.
fn publish(state: &mut MemoryState, before: Option<&ReminderItem>, after: Option<&ReminderItem>) {
    state.subscribers.retain(|subscriber| {
        let was = before.is_some_and(|item| subscriber.query.matches(item));
        let is = after.is_some_and(|item| subscriber.query.matches(item));
        let event = match (was, is, before, after) {
            (false, true, _, Some(item)) => ChangeEvent::added(item.clone()),
            (true, true, _, Some(item)) => ChangeEvent::modified(item.clone()),
            (true, false, Some(last), after) => {
                ChangeEvent::removed(after.cloned().unwrap_or_else(|| last.clone()))
            }
            _ => return !subscriber.tx.is_closed(),
        };
        subscriber.tx.send(event).is_ok()
    });
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn subscribe(&self, query: &ItemQuery) -> crate::Result<ChangeStream> {
        let mut state = self.lock();
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(crate::ReminderError::Store(
                "change feed unavailable".to_owned(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber { query: *query, tx });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn query(&self, query: &ItemQuery) -> crate::Result<Vec<ReminderItem>> {
        let mut gate = self.queries_stalled.subscribe();
        let released = gate.wait_for(|stalled| !*stalled).await.is_ok();
        if !released {
            return Err(crate::ReminderError::Store("item store closed".to_owned()));
        }
        let state = self.lock();
        let mut items: Vec<ReminderItem> = state
            .items
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.due.cmp(&b.due).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }
}

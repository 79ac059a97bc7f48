//! Dedup registry: at most one live schedule per item.
//!
//! The registry is the only shared mutable state in the engine. Every
//! schedule change goes through [`DedupRegistry::upsert`] or
//! [`DedupRegistry::remove`], both of which cancel superseded timers while
//! holding the lock. Fired timers re-validate against the registry through
//! [`DedupRegistry::take_fired`] before dispatching, which closes the race
//! between a late-firing stale timer and a just-applied cancellation.

use crate::item::{ReminderItem, ScheduleKey};
use crate::scheduler::timer::TimerHandle;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

/// One armed tier of a schedule entry.
#[derive(Debug, Clone)]
pub struct ArmedTimer {
    /// Tier label, unique within the entry.
    pub label: String,
    /// Instant the timer was armed for.
    pub trigger_at: DateTime<Utc>,
    /// Cancel handle.
    pub handle: TimerHandle,
}

/// The live schedule for one item.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    /// Item key.
    pub key: ScheduleKey,
    /// Latest known item snapshot, used to render notifications.
    pub item: ReminderItem,
    /// Due instant the timers were derived from.
    pub due: DateTime<Utc>,
    /// Installation number; a fired timer only dispatches while it matches.
    pub generation: u64,
    /// Tiers still waiting to fire, in tier order.
    pub armed: Vec<ArmedTimer>,
}

impl ScheduleEntry {
    fn cancel_all(&self) {
        for timer in &self.armed {
            timer.handle.cancel();
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ScheduleKey, ScheduleEntry>,
    next_generation: u64,
}

/// Map from [`ScheduleKey`] to its single live [`ScheduleEntry`].
#[derive(Default)]
pub struct DedupRegistry {
    state: Mutex<RegistryState>,
}

impl DedupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock cannot leave an entry half-written:
        // every mutation is a single insert/remove.
        self.state.lock().unwrap_or_else(|poisoned| {
            error!("dedup registry lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Install a new entry for `key`, cancelling any existing one first.
    ///
    /// `build` receives the generation of the new entry and runs under the
    /// registry lock, so timers it arms cannot observe the registry before
    /// the entry is installed. Returns `true` when an entry was replaced.
    pub fn upsert<F>(&self, key: &ScheduleKey, build: F) -> bool
    where
        F: FnOnce(u64) -> ScheduleEntry,
    {
        let mut state = self.lock();
        let replaced = state.entries.remove(key);
        if let Some(old) = &replaced {
            old.cancel_all();
        }

        state.next_generation = state.next_generation.wrapping_add(1);
        let generation = state.next_generation;
        let entry = build(generation);
        debug!(
            key = %key,
            generation,
            armed = entry.armed.len(),
            "schedule installed"
        );
        state.entries.insert(key.clone(), entry);
        replaced.is_some()
    }

    /// Cancel every armed timer for `key` and drop the entry.
    ///
    /// Returns `false` when no entry existed.
    pub fn remove(&self, key: &ScheduleKey) -> bool {
        let mut state = self.lock();
        match state.entries.remove(key) {
            Some(entry) => {
                entry.cancel_all();
                debug!(key = %key, "schedule removed");
                true
            }
            None => false,
        }
    }

    /// Whether a schedule exists for `key`.
    pub fn has(&self, key: &ScheduleKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Due instant of the live schedule for `key`.
    pub fn scheduled_due(&self, key: &ScheduleKey) -> Option<DateTime<Utc>> {
        self.lock().entries.get(key).map(|entry| entry.due)
    }

    /// Replace the display snapshot of a live entry without touching timers.
    pub fn refresh_item(&self, key: &ScheduleKey, item: &ReminderItem) -> bool {
        let mut state = self.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.item = item.clone();
                true
            }
            None => false,
        }
    }

    /// Called by a fired timer. Returns the item to notify about when the
    /// timer's entry is still live and the tier is still armed, and disarms
    /// the tier so it cannot fire twice.
    pub fn take_fired(
        &self,
        key: &ScheduleKey,
        generation: u64,
        label: &str,
    ) -> Option<ReminderItem> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(key)?;
        if entry.generation != generation {
            debug!(key = %key, tier = label, "stale timer fired; ignoring");
            return None;
        }
        let position = entry.armed.iter().position(|t| t.label == label)?;
        entry.armed.remove(position);
        Some(entry.item.clone())
    }

    /// Labels of the tiers still armed for `key`, in tier order.
    pub fn armed_tiers(&self, key: &ScheduleKey) -> Vec<String> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.armed.iter().map(|t| t.label.clone()).collect())
            .unwrap_or_default()
    }

    /// Armed timers for `key` with their trigger instants.
    pub fn armed_timers(&self, key: &ScheduleKey) -> Vec<ArmedTimer> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.armed.clone())
            .unwrap_or_default()
    }

    /// Cancel-handle identifiers for `key`, in tier order.
    pub fn handle_ids(&self, key: &ScheduleKey) -> Vec<u64> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.armed.iter().map(|t| t.handle.id()).collect())
            .unwrap_or_default()
    }

    /// Keys with a live entry.
    pub fn keys(&self) -> Vec<ScheduleKey> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Total armed timers across all entries.
    pub fn armed_count(&self) -> usize {
        self.lock().entries.values().map(|e| e.armed.len()).sum()
    }

    /// Remove every entry for which `keep` returns `false`.
    ///
    /// Returns the number of entries removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&ScheduleKey) -> bool,
    {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|key, entry| {
            let kept = keep(key);
            if !kept {
                entry.cancel_all();
            }
            kept
        });
        before - state.entries.len()
    }

    /// Cancel all timers and drop every entry.
    pub fn clear(&self) {
        let mut state = self.lock();
        for entry in state.entries.values() {
            entry.cancel_all();
        }
        state.entries.clear();
    }
}

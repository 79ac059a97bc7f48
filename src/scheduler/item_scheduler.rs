//! Per-item schedule state machine.
//!
//! Each tracked key moves `Unscheduled -> Scheduled -> (Rescheduled |
//! Cancelled) -> Unscheduled`. Both the change feed and the catch-up sweep
//! drive items through here; neither touches the registry directly.

use crate::item::{ReminderItem, ScheduleKey};
use crate::notify::dispatcher::NotificationDispatcher;
use crate::scheduler::registry::{ArmedTimer, DedupRegistry, ScheduleEntry};
use crate::scheduler::tiers::{Tier, Trigger, compute_triggers};
use crate::scheduler::timer::TimerScheduler;
use crate::store::{ChangeEvent, ChangeKind};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of applying one change to the schedule state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new schedule was installed.
    Scheduled,
    /// An existing schedule was replaced after a relevant change.
    Rescheduled,
    /// Surviving tiers of an unchanged schedule were re-armed by a sweep.
    Rearmed,
    /// The schedule was cancelled and removed.
    Cancelled,
    /// Nothing relevant changed; timers untouched.
    Unchanged,
    /// No schedule exists or is needed.
    Skipped,
}

/// Applies item changes to the dedup registry and timer scheduler.
pub struct ItemScheduler {
    registry: Arc<DedupRegistry>,
    timers: TimerScheduler,
    dispatcher: Arc<NotificationDispatcher>,
    tiers: Arc<[Tier]>,
    grace: Duration,
}

impl ItemScheduler {
    /// Wire the scheduler to its collaborators.
    pub fn new(
        registry: Arc<DedupRegistry>,
        timers: TimerScheduler,
        dispatcher: Arc<NotificationDispatcher>,
        tiers: Vec<Tier>,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            timers,
            dispatcher,
            tiers: tiers.into(),
            grace,
        }
    }

    /// The registry this scheduler writes to.
    pub fn registry(&self) -> &Arc<DedupRegistry> {
        &self.registry
    }

    /// The timer scheduler used for arming.
    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    /// Configured tiers, descending lead.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Current instant according to the engine clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.timers.now()
    }

    /// Triggers that would be armed for `due` at `now`.
    pub fn compute_triggers(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Trigger> {
        compute_triggers(&self.tiers, due, now, self.grace)
    }

    /// Apply one change feed event.
    pub fn apply(&self, event: &ChangeEvent) -> Transition {
        let item = &event.item;
        let key = item.key();

        let transition = match event.kind {
            ChangeKind::Removed => self.unschedule(&key),
            ChangeKind::Added | ChangeKind::Modified => match item.due {
                Some(due) if !item.completed => {
                    if self.registry.scheduled_due(&key) == Some(due) {
                        self.registry.refresh_item(&key, item);
                        Transition::Unchanged
                    } else {
                        self.schedule(item, self.now())
                    }
                }
                _ => self.unschedule(&key),
            },
        };

        debug!(key = %key, change = ?event.kind, ?transition, "change applied");
        transition
    }

    /// Compute triggers from scratch and install them, replacing any
    /// existing schedule for the item.
    pub fn schedule(&self, item: &ReminderItem, now: DateTime<Utc>) -> Transition {
        let key = item.key();
        let Some(due) = item.due.filter(|_| !item.completed) else {
            return self.unschedule(&key);
        };

        let triggers = self.compute_triggers(due, now);
        if triggers.is_empty() {
            debug!(key = %key, %due, "every tier already passed; nothing to arm");
            return self.unschedule(&key);
        }

        if self.install(item, due, triggers) {
            Transition::Rescheduled
        } else {
            Transition::Scheduled
        }
    }

    /// Catch-up reconciliation for one pending item.
    ///
    /// A schedule with an unchanged due instant keeps only the tiers that are
    /// still armed and still eligible at `now`, re-armed with fresh delays.
    /// Tiers that already fired stay fired.
    pub fn reconcile(&self, item: &ReminderItem, now: DateTime<Utc>) -> Transition {
        let key = item.key();
        let Some(due) = item.due.filter(|_| !item.completed) else {
            return self.unschedule(&key);
        };
        if self.registry.scheduled_due(&key) != Some(due) {
            return self.schedule(item, now);
        }

        let armed = self.registry.armed_tiers(&key);
        if armed.is_empty() {
            self.registry.refresh_item(&key, item);
            return Transition::Unchanged;
        }

        let survivors: Vec<Trigger> = self
            .compute_triggers(due, now)
            .into_iter()
            .filter(|trigger| armed.iter().any(|label| label == trigger.tier.label()))
            .collect();
        let dropped = armed.len() - survivors.len();
        if dropped > 0 {
            debug!(key = %key, dropped, "dropping stale tiers on catch-up");
        }
        self.install(item, due, survivors);
        Transition::Rearmed
    }

    /// Cancel and remove the schedule for `key`.
    pub fn unschedule(&self, key: &ScheduleKey) -> Transition {
        if self.registry.remove(key) {
            Transition::Cancelled
        } else {
            Transition::Skipped
        }
    }

    /// Arm `triggers` and install them as the live entry. Returns `true`
    /// when a previous entry was replaced.
    fn install(&self, item: &ReminderItem, due: DateTime<Utc>, triggers: Vec<Trigger>) -> bool {
        let key = item.key();
        self.registry.upsert(&key, |generation| {
            let armed = triggers
                .into_iter()
                .map(|trigger| {
                    let fire = self.fire(key.clone(), generation, trigger.tier.clone());
                    ArmedTimer {
                        label: trigger.tier.label().to_owned(),
                        trigger_at: trigger.at,
                        handle: self.timers.arm(trigger.at, fire),
                    }
                })
                .collect();
            ScheduleEntry {
                key: key.clone(),
                item: item.clone(),
                due,
                generation,
                armed,
            }
        })
    }

    fn fire(
        &self,
        key: ScheduleKey,
        generation: u64,
        tier: Tier,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let registry = Arc::clone(&self.registry);
        let dispatcher = Arc::clone(&self.dispatcher);
        async move {
            let Some(item) = registry.take_fired(&key, generation, tier.label()) else {
                return;
            };
            dispatcher.dispatch(&item, &tier).await;
        }
    }
}

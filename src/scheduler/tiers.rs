//! Lead-time tiers and trigger computation.
//!
//! A [`Tier`] is a fixed offset before an item's due instant. Trigger
//! instants are derived purely from the due instant and the tier's lead;
//! nothing per tier is stored beyond the armed timer itself.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// A lead-time offset before the due instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tier {
    label: String,
    lead: Duration,
}

impl Tier {
    /// Create a tier with the given tag label and lead time.
    pub fn new(label: impl Into<String>, lead: Duration) -> Self {
        Self {
            label: label.into(),
            lead,
        }
    }

    /// The built-in tier list: 5 minutes, 1 minute and at the due instant.
    pub fn defaults() -> Vec<Tier> {
        vec![
            Tier::new("5-min", Duration::from_secs(5 * 60)),
            Tier::new("1-min", Duration::from_secs(60)),
            Tier::new("due-now", Duration::ZERO),
        ]
    }

    /// Tag label, e.g. `"1-min"`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Offset before the due instant.
    pub fn lead(&self) -> Duration {
        self.lead
    }

    /// Whether this is the zero-offset tier.
    pub fn is_due_now(&self) -> bool {
        self.lead.is_zero()
    }

    /// Trigger instant for `due`, or `None` if it is not representable.
    pub fn trigger_for(&self, due: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lead = TimeDelta::from_std(self.lead).ok()?;
        due.checked_sub_signed(lead)
    }

    /// Human phrase for notification bodies: `"in 5 minutes"`, `"now"`.
    pub fn describe_lead(&self) -> String {
        let secs = self.lead.as_secs();
        if secs == 0 {
            return "now".to_owned();
        }
        let (amount, unit) = if secs % 3600 == 0 {
            (secs / 3600, "hour")
        } else if secs % 60 == 0 {
            (secs / 60, "minute")
        } else {
            (secs, "second")
        };
        let plural = if amount == 1 { "" } else { "s" };
        format!("in {amount} {unit}{plural}")
    }
}

/// One tier resolved against a concrete due instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// The tier that produced this trigger.
    pub tier: Tier,
    /// When the tier should fire.
    pub at: DateTime<Utc>,
}

/// Compute the triggers that should still be armed for `due` at `now`.
///
/// A trigger is kept when it lies strictly after `now`, or when it is the
/// zero-offset tier and lies at most `grace` in the past. Stale lead-time
/// warnings are never resurrected.
pub fn compute_triggers(
    tiers: &[Tier],
    due: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> Vec<Trigger> {
    let grace = TimeDelta::from_std(grace).unwrap_or(TimeDelta::MAX);

    tiers
        .iter()
        .filter_map(|tier| {
            let at = tier.trigger_for(due)?;
            let eligible = if at > now {
                true
            } else {
                tier.is_due_now() && now.signed_duration_since(at) <= grace
            };
            eligible.then(|| Trigger {
                tier: tier.clone(),
                at,
            })
        })
        .collect()
}

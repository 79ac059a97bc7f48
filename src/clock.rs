//! Time sources for trigger computation.

use chrono::{DateTime, TimeDelta, Utc};

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    /// Current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the system time.
///
/// Catch-up sweeps rely on this observing time that passed while the host
/// was suspended.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored at construction and advanced by the tokio clock.
///
/// Under `tokio::time::pause` this clock moves only when tokio time does,
/// which keeps timer tests deterministic.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor the clock at `wall` for the current tokio instant.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor_instant: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.anchor_instant);
        let delta = TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX);
        self.anchor_wall
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

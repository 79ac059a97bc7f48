//! Reminder scheduling.
//!
//! Tier computation, cancellable timers, the dedup registry keyed by item,
//! the per-item scheduling transitions, the catch-up sweeper and the change
//! feed driver that ties them together.

pub mod feed;
pub mod item_scheduler;
pub mod registry;
pub mod sweep;
pub mod tiers;
pub mod timer;

pub use feed::{Backoff, ChangeFeedSubscriber, EngineCommand, ResumeHandle};
pub use item_scheduler::{ItemScheduler, Transition};
pub use registry::{ArmedTimer, DedupRegistry, ScheduleEntry};
pub use sweep::{CatchUpSweeper, SweepReport};
pub use tiers::{Tier, Trigger, compute_triggers};
pub use timer::{TimerHandle, TimerScheduler};

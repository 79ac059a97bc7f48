//! Reminder delivery: primary surface, fallback channel and the dispatcher
//! that chooses between them.

pub mod dispatcher;
pub mod fallback;
pub mod surface;

pub use dispatcher::{DispatchRecord, DispatchRoute, FallbackReason, NotificationDispatcher};
pub use fallback::{FallbackChannel, FallbackNotice, Severity};
pub use surface::{NoSurface, Notification, NotificationSurface, Permission};

//! Error types for the reminder engine.

/// Top-level error type for the reminder engine.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Item store query or subscription error.
    #[error("store error: {0}")]
    Store(String),

    /// Notification surface error (permission request, delivery).
    #[error("notification error: {0}")]
    Notification(String),

    /// Scheduler error (engine lifecycle, driver state).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ReminderError>;

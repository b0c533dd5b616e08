//! Error types shared across the tracklet core crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for engine operations surfaced at the UI boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Backing store unreachable or a write was rejected. The operation was
    /// aborted with no partial mutation.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The device scheduler could not register a trigger. The reminder
    /// record stays unscheduled and is reported as pending, never dropped.
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Invalid reminder construction (e.g. an empty weekday set).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A reentrant operation targeted a reminder that already has an
    /// operation in flight. Callers should retry after it settles.
    #[error("Operation already in progress for reminder {0}")]
    ConcurrentModification(String),

    #[error("Reminder not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence-layer failures, raised by the storage crate.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Device scheduler adapter failures.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// The adapter rejected the registration after the immediate retry.
    #[error("Failed to register trigger for reminder {reminder_id}: {message}")]
    RegistrationFailed {
        reminder_id: String,
        message: String,
    },

    /// Cancel-side failure; schedule state is repaired by the next
    /// reconciliation pass.
    #[error("Failed to cancel handle {handle}: {message}")]
    CancelFailed { handle: String, message: String },
}

/// Reminder construction/validation failures.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("A weekly reminder requires at least one selected weekday")]
    EmptyWeekdaySet,

    #[error("Weekday index {0} is out of range (expected 0..=6)")]
    WeekdayOutOfRange(u8),

    #[error("Reminder title must not be empty")]
    EmptyTitle,
}

impl SchedulingError {
    pub fn registration_failed(reminder_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            reminder_id: reminder_id.into(),
            message: message.into(),
        }
    }
}

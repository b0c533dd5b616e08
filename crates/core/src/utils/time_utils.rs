//! Clock abstraction and RFC3339 helpers.

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};

use crate::errors::{DatabaseError, Error, Result};

/// Source of "now" and the device's current UTC offset.
///
/// The engine reads wall-clock time only through this trait so that
/// lifecycle and reconciliation behavior can be exercised at fixed instants
/// and simulated timezone changes. The recurrence resolver itself never
/// reads a clock; callers pass `after` explicitly.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current device-local UTC offset. Triggers are always recomputed from
    /// the offset in effect at resolution time; wall-clock slots promised
    /// under a previous offset are not preserved.
    fn local_offset(&self) -> FixedOffset;
}

/// Clock backed by the host system.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

/// Parse an RFC3339 timestamp persisted by the storage layer.
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            Error::Database(DatabaseError::Internal(format!(
                "Invalid stored timestamp '{}': {}",
                value, e
            )))
        })
}

/// Format a timestamp the way the storage layer persists it.
pub fn to_rfc3339<Tz: TimeZone>(value: &DateTime<Tz>) -> String {
    value.with_timezone(&Utc).to_rfc3339()
}

//! Device scheduler adapter contract.
//!
//! Platform shells implement [`DeviceSchedulerTrait`] once per scheduling
//! path: a standard local-notification variant (Normal mode, best effort,
//! may be deferred or dropped by the OS) and a native exact-alarm variant
//! (Alarm mode, permission-gated). The lifecycle manager composes the two
//! and stays platform-agnostic.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

use super::reminders_model::WeekdaySet;

/// Notification content handed to the OS scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub reminder_id: String,
    pub title: String,
    pub body: Option<String>,
}

/// Trigger registration request.
///
/// `first_at` is always the concrete next instant so that adapters without
/// native repetition can register a one-shot and let the engine re-arm on
/// each delivery; adapters with native day-of-week repetition may register
/// a standing trigger instead (one per weekday for `Weekly`).
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSpec {
    Once {
        at: DateTime<Utc>,
    },
    Daily {
        at_time: NaiveTime,
        first_at: DateTime<Utc>,
    },
    Weekly {
        at_time: NaiveTime,
        weekdays: WeekdaySet,
        first_at: DateTime<Utc>,
    },
}

impl TriggerSpec {
    /// The next concrete instant this registration fires at.
    pub fn first_at(&self) -> DateTime<Utc> {
        match self {
            Self::Once { at } => *at,
            Self::Daily { first_at, .. } | Self::Weekly { first_at, .. } => *first_at,
        }
    }
}

/// Capability set of an OS-level notification/alarm scheduler.
#[async_trait]
pub trait DeviceSchedulerTrait: Send + Sync {
    /// Register `trigger` and return the opaque handle(s) the platform
    /// assigned: one for `Once`/`Daily`, one per selected weekday for a
    /// `Weekly` fan-out.
    async fn schedule(
        &self,
        trigger: &TriggerSpec,
        payload: &NotificationPayload,
    ) -> Result<Vec<String>>;

    /// Cancel a previously returned handle. Idempotent: canceling an
    /// already-fired or already-canceled handle is a no-op.
    async fn cancel(&self, handle: &str) -> Result<()>;

    /// Whether registrations for recurring triggers stand across fires. A
    /// `false` here makes the engine re-arm after each delivery.
    fn supports_repeating(&self) -> bool;

    /// Whether exact-alarm scheduling is currently permitted.
    fn can_schedule_exact(&self) -> bool;

    /// Ask the OS for the exact-alarm permission. Returns the resulting
    /// grant state.
    async fn request_exact_permission(&self) -> Result<bool>;
}

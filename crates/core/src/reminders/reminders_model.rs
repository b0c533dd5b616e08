//! Reminder domain models.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Reminder capability set.
///
/// `Global` reminders are broadcast server-side over the push channel and
/// never scheduled on-device; `Local` reminders belong to one user and one
/// device schedule; `Custom` reminders fan out to one OS notification per
/// selected weekday, each individually cancelable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Global,
    Local,
    Custom,
}

/// Scheduling path. Alarm mode uses the native exact-alarm capability and
/// is permission-gated; Normal mode uses standard local notifications and
/// is subject to OS deferral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMode {
    Alarm,
    Normal,
}

/// Non-empty set of weekdays, encoded 0=Sunday..6=Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn from_days(days: &[u8]) -> Result<Self, ValidationError> {
        let mut mask = 0u8;
        for &day in days {
            if day > 6 {
                return Err(ValidationError::WeekdayOutOfRange(day));
            }
            mask |= 1 << day;
        }
        if mask == 0 {
            return Err(ValidationError::EmptyWeekdaySet);
        }
        Ok(Self(mask))
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_sunday() as u8) != 0
    }

    /// Selected day indices in ascending order.
    pub fn days(&self) -> Vec<u8> {
        (0..7u8).filter(|day| self.0 & (1 << day) != 0).collect()
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        // Construction forbids the empty set; kept for API completeness.
        self.0 == 0
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.days().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let days = Vec::<u8>::deserialize(deserializer)?;
        Self::from_days(&days).map_err(serde::de::Error::custom)
    }
}

/// Declared trigger pattern of a reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReminderPattern {
    #[serde(rename_all = "camelCase")]
    OneTime { at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    Daily { at_time: NaiveTime },
    #[serde(rename_all = "camelCase")]
    Weekly {
        at_time: NaiveTime,
        weekdays: WeekdaySet,
    },
}

impl ReminderPattern {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::OneTime { .. })
    }
}

/// Derived lifecycle state, computed from the persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    Draft,
    Scheduled,
    Fired,
    Completed,
    Canceled,
}

/// A user's reminder, including the device-schedule bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub body: Option<String>,
    pub kind: ReminderKind,
    pub pattern: ReminderPattern,
    pub mode: ReminderMode,
    /// Identifiers currently registered with the device scheduler for this
    /// reminder; empty when not scheduled. Persisted so that a logical
    /// reminder fanned out over several OS notifications stays cancelable
    /// across restarts and reinstalls.
    pub notification_handles: Vec<String>,
    /// The instant the current handles were registered for. Compared against
    /// a fresh resolution during reconciliation to detect drift.
    pub next_trigger_at: Option<DateTime<Utc>>,
    /// Delivery observed for single-shot reminders. Delivery is not
    /// completion; the user still has to acknowledge.
    pub delivered: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn is_one_shot(&self) -> bool {
        !self.pattern.is_recurring()
    }

    /// Once set, `delivered` and `completed_at` are never cleared by the
    /// engine; only an explicit re-open (not exposed here) may do so.
    pub fn state(&self) -> ReminderState {
        if self.canceled_at.is_some() {
            ReminderState::Canceled
        } else if self.completed_at.is_some() {
            ReminderState::Completed
        } else if self.is_one_shot() && self.delivered {
            ReminderState::Fired
        } else if !self.notification_handles.is_empty() || self.kind == ReminderKind::Global {
            // Global reminders are held server-side until broadcast.
            ReminderState::Scheduled
        } else {
            ReminderState::Draft
        }
    }
}

/// One concrete, datable firing of a recurring reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderOccurrence {
    pub id: String,
    pub reminder_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a reminder via the UI submit path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub owner_id: String,
    pub title: String,
    pub body: Option<String>,
    pub kind: ReminderKind,
    pub pattern: ReminderPattern,
    pub mode: ReminderMode,
}

impl NewReminder {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        // WeekdaySet construction already rejects the empty set; this guards
        // records deserialized from an external payload.
        if let ReminderPattern::Weekly { weekdays, .. } = &self.pattern {
            if weekdays.is_empty() {
                return Err(ValidationError::EmptyWeekdaySet);
            }
        }
        Ok(())
    }
}

/// Content changes applied by an edit. Kind is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderUpdate {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub pattern: ReminderPattern,
    pub mode: ReminderMode,
}

/// Entry of the upcoming feed, ordered by trigger instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEntry {
    pub reminder: Reminder,
    /// Present when this entry is a fired-but-unacknowledged occurrence of a
    /// recurring reminder rather than a pending trigger.
    pub occurrence: Option<ReminderOccurrence>,
    pub trigger_at: DateTime<Utc>,
}

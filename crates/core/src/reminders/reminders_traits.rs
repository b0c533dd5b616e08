//! Persistence contract consumed by the reminder engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

use super::reminders_model::{NewReminder, Reminder, ReminderOccurrence};

/// Result of a guarded occurrence upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceUpsert {
    pub occurrence: ReminderOccurrence,
    /// False when a row for `(reminder_id, scheduled_at)` already existed:
    /// a duplicate OS fire, absorbed as success.
    pub created: bool,
}

/// Repository contract for reminders and their occurrences.
///
/// Reads are synchronous, writes asynchronous, matching the storage
/// crate's pooled-read / serialized-write split.
#[async_trait]
pub trait ReminderRepositoryTrait: Send + Sync {
    /// Non-canceled, non-completed reminders for one owner; the working set
    /// of the reconciliation pass.
    fn load_active_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>>;

    fn load_reminder(&self, reminder_id: &str) -> Result<Reminder>;

    async fn insert_reminder(&self, new_reminder: NewReminder) -> Result<Reminder>;

    /// Full-record upsert: content fields, handles and trigger bookkeeping
    /// in one write.
    async fn update_reminder(&self, reminder: Reminder) -> Result<Reminder>;

    /// Replace the recorded device-scheduler handles and the instant they
    /// were computed for.
    async fn update_handles(
        &self,
        reminder_id: &str,
        handles: Vec<String>,
        next_trigger_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Guarded `delivered` transition. Returns whether this call performed
    /// it; a `false` absorbs duplicate delivery callbacks.
    async fn mark_delivered(&self, reminder_id: &str) -> Result<bool>;

    /// Guarded completion of a one-time reminder (`WHERE completed_at IS
    /// NULL`). Returns whether this call performed the transition.
    async fn complete_reminder(
        &self,
        reminder_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Guarded completion of a single occurrence.
    async fn complete_occurrence(
        &self,
        occurrence_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Guarded unique insert on `(reminder_id, scheduled_at)`; returns the
    /// existing row with `created == false` when one is already present.
    async fn upsert_occurrence(
        &self,
        reminder_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<OccurrenceUpsert>;

    fn load_occurrences(&self, reminder_id: &str) -> Result<Vec<ReminderOccurrence>>;

    fn load_occurrence(&self, occurrence_id: &str) -> Result<ReminderOccurrence>;

    /// Fired-but-unacknowledged occurrences across all of an owner's
    /// reminders, for the upcoming feed.
    fn load_pending_occurrences(&self, owner_id: &str) -> Result<Vec<ReminderOccurrence>>;

    /// Soft-cancel: the record stays for history but leaves every active
    /// query.
    async fn cancel_reminder(&self, reminder_id: &str, canceled_at: DateTime<Utc>) -> Result<()>;

    /// Hard delete; occurrences cascade.
    async fn delete_reminder(&self, reminder_id: &str) -> Result<usize>;
}

//! Domain events emitted after reminder mutations.
//!
//! Runtime bridges (Tauri/Web) implement [`DomainEventSink`] to push live
//! updates to the UI layer; services emit fire-and-forget after the
//! mutation has been persisted.

use serde::{Deserialize, Serialize};

use crate::reminders::ReminderState;

/// Events emitted by the reminder engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A reminder transitioned lifecycle state (created, scheduled, fired,
    /// completed, canceled) or its schedule was repaired.
    #[serde(rename_all = "camelCase")]
    ReminderStateChanged {
        reminder_id: String,
        state: ReminderState,
    },

    /// Alarm mode was requested but exact scheduling is unavailable; the
    /// reminder was scheduled on the normal path instead.
    #[serde(rename_all = "camelCase")]
    ReminderSchedulingDegraded { reminder_id: String },

    /// Reconciliation failed to repair this reminder twice in a row.
    #[serde(rename_all = "camelCase")]
    ReminderRepairFlagged {
        reminder_id: String,
        consecutive_failures: u32,
    },
}

/// Sink for domain events. Implementations must not block.
pub trait DomainEventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Default sink that drops all events.
pub struct NoOpDomainEventSink;

impl DomainEventSink for NoOpDomainEventSink {
    fn emit(&self, _event: DomainEvent) {}
}

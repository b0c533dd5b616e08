//! Reconciliation pass: converge recorded schedule state to intent.
//!
//! Individual `schedule`/`cancel` calls are allowed to fail or be missed
//! (crash mid-edit, OS kill, reinstall); this pass recomputes the expected
//! schedule for every active reminder and repairs drift in both
//! directions. The repair decision itself is a pure function so the drift
//! matrix is testable without a device scheduler.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::recurrence::next_trigger;
use super::reminders_model::{Reminder, ReminderKind, ReminderPattern};

/// Foreground-resume debounce: a resume within this window of the previous
/// pass does not trigger another one.
pub const RECONCILE_FOREGROUND_THRESHOLD_SECS: u64 = 5 * 60;

/// Consecutive repair failures after which a reminder is flagged.
pub const REPAIR_FLAG_THRESHOLD: u32 = 2;

/// Signal that started a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTrigger {
    ColdStart,
    ForegroundResume,
    PermissionChanged,
    TimezoneChanged,
}

/// Outcome counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub examined: usize,
    pub scheduled_fresh: usize,
    pub rescheduled: usize,
    pub implicit_fires: usize,
    pub cleared: usize,
    pub repair_failures: usize,
    pub flagged: usize,
}

/// Repair decided for one reminder.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairAction {
    /// Recorded state matches intent.
    None,
    /// Active reminder with no recorded handles (reinstall, OS-cleared
    /// notifications, permission newly granted): schedule from scratch.
    ScheduleFresh { next: DateTime<Utc> },
    /// Recorded handles were registered for a different instant than a
    /// fresh resolution produces (timezone change): cancel and re-register.
    RescheduleDrifted { next: DateTime<Utc> },
    /// The promised instant passed while the app was not running: treat as
    /// a fire before rescheduling so the occurrence is not skipped.
    ImplicitFire { scheduled_at: DateTime<Utc> },
    /// A settled reminder still holds handles: cancel them.
    ClearStaleHandles,
}

/// Decide the repair for one reminder against a fresh resolution at `now`.
pub fn plan_repair<Tz: TimeZone>(reminder: &Reminder, now: &DateTime<Tz>) -> RepairAction {
    let has_handles = !reminder.notification_handles.is_empty();

    // Global reminders ride the server push channel, never the device
    // scheduler. Settled reminders only need their leftovers cleaned up.
    let settled = reminder.canceled_at.is_some()
        || reminder.completed_at.is_some()
        || (reminder.is_one_shot() && reminder.delivered);
    if reminder.kind == ReminderKind::Global || settled {
        return if has_handles {
            RepairAction::ClearStaleHandles
        } else {
            RepairAction::None
        };
    }

    let now_utc = now.with_timezone(&Utc);
    if let Some(promised) = reminder.next_trigger_at {
        if promised <= now_utc {
            return RepairAction::ImplicitFire {
                scheduled_at: promised,
            };
        }
    }

    match next_trigger(&reminder.pattern, now) {
        None => {
            // Elapsed one-time that was never armed on this device.
            let ReminderPattern::OneTime { at } = &reminder.pattern else {
                return RepairAction::None;
            };
            RepairAction::ImplicitFire { scheduled_at: *at }
        }
        Some(next) => {
            let next = next.with_timezone(&Utc);
            if !has_handles {
                RepairAction::ScheduleFresh { next }
            } else if reminder.next_trigger_at != Some(next) {
                RepairAction::RescheduleDrifted { next }
            } else {
                RepairAction::None
            }
        }
    }
}

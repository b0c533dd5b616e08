//! Reminder lifecycle manager.
//!
//! Owns the create → scheduled → fired → completed state machine, the
//! handle bookkeeping against the device scheduler, and the reconciliation
//! pass. Operations on the same reminder are serialized by the host event
//! loop; reentrant calls are rejected rather than raced (see `begin_op`).

use std::cmp;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, SchedulingError};
use crate::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use crate::utils::time_utils::{Clock, SystemClock};

use super::reconciliation::{
    plan_repair, ReconcileSummary, ReconcileTrigger, RepairAction, REPAIR_FLAG_THRESHOLD,
};
use super::recurrence::next_trigger;
use super::reminders_model::{
    NewReminder, Reminder, ReminderKind, ReminderMode, ReminderPattern, ReminderState,
    ReminderUpdate, UpcomingEntry,
};
use super::reminders_traits::ReminderRepositoryTrait;
use super::scheduler::{DeviceSchedulerTrait, NotificationPayload, TriggerSpec};

/// Result of `create_reminder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReminderOutcome {
    pub reminder: Reminder,
    pub state: ReminderState,
    /// Alarm mode was requested but exact scheduling is unavailable; the
    /// reminder went out on the normal path.
    pub scheduling_degraded: bool,
}

/// What `complete` targets: a one-time reminder or one occurrence of a
/// recurring one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum CompletionTarget {
    Reminder(String),
    Occurrence(String),
}

/// Idempotency-reporting result of `complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed,
    AlreadyCompleted,
}

/// Engine surface exposed to the UI layer and the delivery listener.
#[async_trait]
pub trait ReminderServiceTrait: Send + Sync {
    async fn create_reminder(&self, new_reminder: NewReminder) -> Result<CreateReminderOutcome>;

    async fn update_reminder(&self, update: ReminderUpdate) -> Result<Reminder>;

    async fn cancel_reminder(&self, reminder_id: &str) -> Result<()>;

    async fn delete_reminder(&self, reminder_id: &str) -> Result<()>;

    async fn complete(&self, target: CompletionTarget) -> Result<CompletionOutcome>;

    /// Route a delivery (OS notification fired/opened, native alarm fired,
    /// server broadcast) into the state machine. `scheduled_at` is the
    /// promised instant when the platform callback carries one.
    async fn record_fired(
        &self,
        reminder_id: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    fn list_upcoming(&self, owner_id: &str) -> Result<Vec<UpcomingEntry>>;

    async fn reconcile(
        &self,
        owner_id: &str,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileSummary>;
}

pub struct ReminderService {
    repository: Arc<dyn ReminderRepositoryTrait>,
    notification_scheduler: Arc<dyn DeviceSchedulerTrait>,
    alarm_scheduler: Arc<dyn DeviceSchedulerTrait>,
    clock: Arc<dyn Clock>,
    event_sink: Arc<dyn DomainEventSink>,
    /// Reminder ids with an operation in flight; reentrant entry is
    /// rejected with `ConcurrentModification` instead of racing handle
    /// writes.
    in_flight: Mutex<HashSet<String>>,
    /// Cancellations requested while the same reminder's create/edit was
    /// in flight; applied when that operation settles.
    pending_cancel: Mutex<HashSet<String>>,
    repair_failures: Mutex<HashMap<String, u32>>,
}

/// Removes the in-flight claim when an operation settles, also on error
/// paths.
struct OperationGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    reminder_id: String,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.reminder_id);
    }
}

impl ReminderService {
    pub fn new(
        repository: Arc<dyn ReminderRepositoryTrait>,
        notification_scheduler: Arc<dyn DeviceSchedulerTrait>,
        alarm_scheduler: Arc<dyn DeviceSchedulerTrait>,
    ) -> Self {
        Self {
            repository,
            notification_scheduler,
            alarm_scheduler,
            clock: Arc::new(SystemClock),
            event_sink: Arc::new(NoOpDomainEventSink),
            in_flight: Mutex::new(HashSet::new()),
            pending_cancel: Mutex::new(HashSet::new()),
            repair_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the domain event sink for emitting state-change events.
    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn begin_op(&self, reminder_id: &str) -> Result<OperationGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(reminder_id.to_string()) {
            return Err(Error::ConcurrentModification(reminder_id.to_string()));
        }
        Ok(OperationGuard {
            in_flight: &self.in_flight,
            reminder_id: reminder_id.to_string(),
        })
    }

    fn take_pending_cancel(&self, reminder_id: &str) -> bool {
        self.pending_cancel.lock().unwrap().remove(reminder_id)
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        self.clock.now_utc().with_timezone(&self.clock.local_offset())
    }

    fn scheduler_for(&self, mode: ReminderMode) -> Arc<dyn DeviceSchedulerTrait> {
        match mode {
            ReminderMode::Alarm => Arc::clone(&self.alarm_scheduler),
            ReminderMode::Normal => Arc::clone(&self.notification_scheduler),
        }
    }

    /// Resolves the scheduling path for a requested mode. Alarm mode
    /// without the exact-alarm grant asks for it once, then falls back to
    /// the normal path and reports the degradation.
    async fn effective_mode(
        &self,
        reminder_id: &str,
        requested: ReminderMode,
    ) -> (ReminderMode, bool) {
        if requested != ReminderMode::Alarm {
            return (ReminderMode::Normal, false);
        }
        if self.alarm_scheduler.can_schedule_exact() {
            return (ReminderMode::Alarm, false);
        }
        match self.alarm_scheduler.request_exact_permission().await {
            Ok(true) => (ReminderMode::Alarm, false),
            Ok(false) => {
                warn!(
                    "[Reminders] Exact-alarm permission denied, scheduling {} on the normal path",
                    reminder_id
                );
                (ReminderMode::Normal, true)
            }
            Err(err) => {
                warn!(
                    "[Reminders] Exact-alarm permission request failed for {}: {}",
                    reminder_id, err
                );
                (ReminderMode::Normal, true)
            }
        }
    }

    fn trigger_spec(pattern: &ReminderPattern, next: DateTime<Utc>) -> TriggerSpec {
        match pattern {
            ReminderPattern::OneTime { .. } => TriggerSpec::Once { at: next },
            ReminderPattern::Daily { at_time } => TriggerSpec::Daily {
                at_time: *at_time,
                first_at: next,
            },
            ReminderPattern::Weekly { at_time, weekdays } => TriggerSpec::Weekly {
                at_time: *at_time,
                weekdays: *weekdays,
                first_at: next,
            },
        }
    }

    fn payload(reminder: &Reminder) -> NotificationPayload {
        NotificationPayload {
            reminder_id: reminder.id.clone(),
            title: reminder.title.clone(),
            body: reminder.body.clone(),
        }
    }

    async fn schedule_with_retry(
        &self,
        scheduler: &Arc<dyn DeviceSchedulerTrait>,
        trigger: &TriggerSpec,
        payload: &NotificationPayload,
        reminder_id: &str,
    ) -> Result<Vec<String>> {
        match scheduler.schedule(trigger, payload).await {
            Ok(handles) => Ok(handles),
            Err(first_err) => {
                debug!(
                    "[Reminders] Schedule failed for {}, retrying once: {}",
                    reminder_id, first_err
                );
                scheduler.schedule(trigger, payload).await.map_err(|err| {
                    Error::Scheduling(SchedulingError::registration_failed(
                        reminder_id,
                        err.to_string(),
                    ))
                })
            }
        }
    }

    /// Best-effort cancel against both scheduling paths; `cancel` is
    /// idempotent, so an unknown handle on either path is a no-op.
    async fn cancel_all(&self, handles: &[String]) {
        for handle in handles {
            if let Err(err) = self.notification_scheduler.cancel(handle).await {
                warn!("[Reminders] Failed to cancel handle {}: {}", handle, err);
            }
            if let Err(err) = self.alarm_scheduler.cancel(handle).await {
                warn!("[Reminders] Failed to cancel alarm handle {}: {}", handle, err);
            }
        }
    }

    /// Register `next` with the device scheduler and persist the handle
    /// list. Returns the handles and whether the mode degraded.
    async fn arm(&self, reminder: &Reminder, next: DateTime<Utc>) -> Result<(Vec<String>, bool)> {
        let (mode, degraded) = self.effective_mode(&reminder.id, reminder.mode).await;
        let scheduler = self.scheduler_for(mode);
        let spec = Self::trigger_spec(&reminder.pattern, next);
        let handles = self
            .schedule_with_retry(&scheduler, &spec, &Self::payload(reminder), &reminder.id)
            .await?;
        self.repository
            .update_handles(&reminder.id, handles.clone(), Some(next))
            .await?;
        if degraded {
            self.event_sink.emit(DomainEvent::ReminderSchedulingDegraded {
                reminder_id: reminder.id.clone(),
            });
        }
        Ok((handles, degraded))
    }

    fn emit_state(&self, reminder: &Reminder) {
        self.event_sink.emit(DomainEvent::ReminderStateChanged {
            reminder_id: reminder.id.clone(),
            state: reminder.state(),
        });
    }

    /// Settle a cancellation that arrived while an operation on this
    /// reminder was in flight: its just-registered handles are discarded
    /// immediately.
    async fn settle_pending_cancel(&self, reminder: &mut Reminder) -> Result<bool> {
        if !self.take_pending_cancel(&reminder.id) {
            return Ok(false);
        }
        info!(
            "[Reminders] Cancellation requested mid-operation for {}, discarding schedule",
            reminder.id
        );
        self.cancel_all(&reminder.notification_handles).await;
        self.repository
            .update_handles(&reminder.id, vec![], None)
            .await?;
        let now = self.clock.now_utc();
        self.repository.cancel_reminder(&reminder.id, now).await?;
        reminder.notification_handles.clear();
        reminder.next_trigger_at = None;
        reminder.canceled_at = Some(now);
        Ok(true)
    }

    async fn create_reminder_impl(&self, new_reminder: NewReminder) -> Result<CreateReminderOutcome> {
        new_reminder.validate()?;
        let mut reminder = self.repository.insert_reminder(new_reminder).await?;
        let _guard = self.begin_op(&reminder.id)?;
        debug!(
            "[Reminders] Created {} kind={:?} mode={:?}",
            reminder.id, reminder.kind, reminder.mode
        );

        let mut degraded = false;
        if reminder.kind == ReminderKind::Global {
            // Broadcast reminders ride the server push channel; nothing to
            // register on this device.
            self.emit_state(&reminder);
            return Ok(CreateReminderOutcome {
                state: reminder.state(),
                reminder,
                scheduling_degraded: false,
            });
        }

        match next_trigger(&reminder.pattern, &self.now_local()) {
            None => {
                // The one-time instant already elapsed: fire immediately
                // and wait for acknowledgement instead of dropping.
                self.repository.mark_delivered(&reminder.id).await?;
                reminder.delivered = true;
                warn!(
                    "[Reminders] {} created with an elapsed trigger, marked delivered",
                    reminder.id
                );
            }
            Some(next) => {
                let next = next.with_timezone(&Utc);
                let arm_result = self.arm(&reminder, next).await;
                let (handles, was_degraded) = match arm_result {
                    Ok(value) => value,
                    Err(err) => {
                        // Record stays, shown as pending/unscheduled.
                        self.emit_state(&reminder);
                        return Err(err);
                    }
                };
                reminder.notification_handles = handles;
                reminder.next_trigger_at = Some(next);
                degraded = was_degraded;
            }
        }

        self.settle_pending_cancel(&mut reminder).await?;
        self.emit_state(&reminder);
        Ok(CreateReminderOutcome {
            state: reminder.state(),
            reminder,
            scheduling_degraded: degraded,
        })
    }

    async fn update_reminder_impl(&self, update: ReminderUpdate) -> Result<Reminder> {
        let _guard = self.begin_op(&update.id)?;
        let current = self.repository.load_reminder(&update.id)?;

        // Cancel-then-schedule: the old handles leave the device before
        // the content swap, and the stored handle list is only replaced
        // after a successful re-schedule. A failure in between leaves the
        // record on the pre-edit list, never a partial one.
        self.cancel_all(&current.notification_handles).await;

        let mut updated = current.clone();
        updated.title = update.title;
        updated.body = update.body;
        updated.pattern = update.pattern;
        updated.mode = update.mode;

        let mut degraded = false;
        if updated.kind == ReminderKind::Global {
            updated.notification_handles = vec![];
            updated.next_trigger_at = None;
        } else {
            match next_trigger(&updated.pattern, &self.now_local()) {
                None => {
                    updated.notification_handles = vec![];
                    updated.next_trigger_at = None;
                    updated.delivered = true;
                    warn!(
                        "[Reminders] {} edited to an elapsed trigger, marked delivered",
                        updated.id
                    );
                }
                Some(next) => {
                    let next = next.with_timezone(&Utc);
                    let (mode, was_degraded) =
                        self.effective_mode(&updated.id, updated.mode).await;
                    let scheduler = self.scheduler_for(mode);
                    let spec = Self::trigger_spec(&updated.pattern, next);
                    let handles = self
                        .schedule_with_retry(
                            &scheduler,
                            &spec,
                            &Self::payload(&updated),
                            &updated.id,
                        )
                        .await?;
                    updated.notification_handles = handles;
                    updated.next_trigger_at = Some(next);
                    degraded = was_degraded;
                }
            }
        }

        let mut updated = self.repository.update_reminder(updated).await?;
        if degraded {
            self.event_sink.emit(DomainEvent::ReminderSchedulingDegraded {
                reminder_id: updated.id.clone(),
            });
        }
        self.settle_pending_cancel(&mut updated).await?;
        self.emit_state(&updated);
        Ok(updated)
    }

    async fn cancel_reminder_impl(&self, reminder_id: &str) -> Result<()> {
        let _guard = match self.begin_op(reminder_id) {
            Ok(guard) => guard,
            Err(Error::ConcurrentModification(_)) => {
                // An edit/create is mid-await on this reminder; defer. The
                // settling operation discards its schedule result.
                debug!(
                    "[Reminders] Deferring cancel of {} until in-flight operation settles",
                    reminder_id
                );
                self.pending_cancel
                    .lock()
                    .unwrap()
                    .insert(reminder_id.to_string());
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let mut reminder = self.repository.load_reminder(reminder_id)?;
        self.cancel_all(&reminder.notification_handles).await;
        self.repository
            .update_handles(reminder_id, vec![], None)
            .await?;
        let now = self.clock.now_utc();
        self.repository.cancel_reminder(reminder_id, now).await?;
        reminder.notification_handles.clear();
        reminder.canceled_at = Some(now);
        self.emit_state(&reminder);
        info!("[Reminders] Canceled {}", reminder_id);
        Ok(())
    }

    async fn delete_reminder_impl(&self, reminder_id: &str) -> Result<()> {
        let _guard = match self.begin_op(reminder_id) {
            Ok(guard) => guard,
            Err(Error::ConcurrentModification(_)) => {
                // Deferred as a cancel; the record stays for an explicit
                // delete retry once the in-flight operation settles.
                self.pending_cancel
                    .lock()
                    .unwrap()
                    .insert(reminder_id.to_string());
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let reminder = self.repository.load_reminder(reminder_id)?;
        self.cancel_all(&reminder.notification_handles).await;
        let deleted = self.repository.delete_reminder(reminder_id).await?;
        self.event_sink.emit(DomainEvent::ReminderStateChanged {
            reminder_id: reminder_id.to_string(),
            state: ReminderState::Canceled,
        });
        info!("[Reminders] Deleted {} ({} rows)", reminder_id, deleted);
        Ok(())
    }

    async fn complete_impl(&self, target: CompletionTarget) -> Result<CompletionOutcome> {
        let now = self.clock.now_utc();
        match target {
            CompletionTarget::Reminder(reminder_id) => {
                let transitioned = self.repository.complete_reminder(&reminder_id, now).await?;
                if !transitioned {
                    debug!("[Reminders] {} already completed", reminder_id);
                    return Ok(CompletionOutcome::AlreadyCompleted);
                }
                let reminder = self.repository.load_reminder(&reminder_id)?;
                // Manual completion may precede the OS fire; the pending
                // trigger is consumed either way.
                if !reminder.notification_handles.is_empty() {
                    self.cancel_all(&reminder.notification_handles).await;
                    self.repository
                        .update_handles(&reminder_id, vec![], None)
                        .await?;
                }
                self.event_sink.emit(DomainEvent::ReminderStateChanged {
                    reminder_id,
                    state: ReminderState::Completed,
                });
                Ok(CompletionOutcome::Completed)
            }
            CompletionTarget::Occurrence(occurrence_id) => {
                let transitioned = self
                    .repository
                    .complete_occurrence(&occurrence_id, now)
                    .await?;
                if !transitioned {
                    debug!("[Reminders] Occurrence {} already completed", occurrence_id);
                    return Ok(CompletionOutcome::AlreadyCompleted);
                }
                let occurrence = self.repository.load_occurrence(&occurrence_id)?;
                let reminder = self.repository.load_reminder(&occurrence.reminder_id)?;
                self.emit_state(&reminder);
                Ok(CompletionOutcome::Completed)
            }
        }
    }

    async fn record_fired_impl(
        &self,
        reminder_id: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let reminder = self.repository.load_reminder(reminder_id)?;
        if reminder.canceled_at.is_some() {
            debug!("[Reminders] Ignoring fire for canceled reminder {}", reminder_id);
            return Ok(());
        }

        if reminder.is_one_shot() {
            // Delivery, not completion: the user still has to acknowledge.
            let transitioned = self.repository.mark_delivered(reminder_id).await?;
            if !transitioned {
                debug!("[Reminders] Duplicate fire for {}", reminder_id);
                return Ok(());
            }
            if !reminder.notification_handles.is_empty() || reminder.next_trigger_at.is_some() {
                self.cancel_all(&reminder.notification_handles).await;
                self.repository
                    .update_handles(reminder_id, vec![], None)
                    .await?;
            }
            self.event_sink.emit(DomainEvent::ReminderStateChanged {
                reminder_id: reminder_id.to_string(),
                state: ReminderState::Fired,
            });
            return Ok(());
        }

        // Recurring: materialize the occurrence at the promised instant so
        // a late OS delivery does not fork a second row.
        let promised = scheduled_at
            .or(reminder.next_trigger_at)
            .unwrap_or_else(|| self.clock.now_utc());
        let upsert = self.repository.upsert_occurrence(reminder_id, promised).await?;
        if !upsert.created {
            debug!(
                "[Reminders] Duplicate fire for {} at {}, occurrence already materialized",
                reminder_id, promised
            );
            return Ok(());
        }
        self.emit_state(&reminder);

        let (mode, _) = self.effective_mode(reminder_id, reminder.mode).await;
        let scheduler = self.scheduler_for(mode);
        // The fired slot itself must not resolve again.
        let after = cmp::max(self.clock.now_utc(), promised + Duration::seconds(1))
            .with_timezone(&self.clock.local_offset());
        let next = next_trigger(&reminder.pattern, &after).map(|dt| dt.with_timezone(&Utc));

        if scheduler.supports_repeating() {
            // Standing registration keeps firing on its own; only the
            // bookkeeping instant moves forward.
            self.repository
                .update_handles(reminder_id, reminder.notification_handles.clone(), next)
                .await?;
            return Ok(());
        }

        // One-shot strategy: the consumed handle is replaced by the next
        // registration.
        self.cancel_all(&reminder.notification_handles).await;
        let Some(next) = next else {
            self.repository
                .update_handles(reminder_id, vec![], None)
                .await?;
            return Ok(());
        };
        match self.arm(&reminder, next).await {
            Ok(_) => Ok(()),
            Err(err) => {
                // Leave the record visibly unscheduled; the next
                // reconciliation pass re-arms it.
                self.repository
                    .update_handles(reminder_id, vec![], None)
                    .await?;
                warn!("[Reminders] Re-arm failed for {}: {}", reminder_id, err);
                Err(err)
            }
        }
    }

    fn list_upcoming_impl(&self, owner_id: &str) -> Result<Vec<UpcomingEntry>> {
        let now_local = self.now_local();
        let mut entries = Vec::new();

        for reminder in self.repository.load_active_reminders(owner_id)? {
            let trigger_at = reminder
                .next_trigger_at
                .or_else(|| {
                    next_trigger(&reminder.pattern, &now_local).map(|dt| dt.with_timezone(&Utc))
                })
                .or(match reminder.pattern {
                    // Fired-but-unacknowledged one-times sort at their
                    // original instant.
                    ReminderPattern::OneTime { at } => Some(at),
                    _ => None,
                });
            if let Some(trigger_at) = trigger_at {
                entries.push(UpcomingEntry {
                    reminder,
                    occurrence: None,
                    trigger_at,
                });
            }
        }

        for occurrence in self.repository.load_pending_occurrences(owner_id)? {
            let reminder = self.repository.load_reminder(&occurrence.reminder_id)?;
            entries.push(UpcomingEntry {
                reminder,
                trigger_at: occurrence.scheduled_at,
                occurrence: Some(occurrence),
            });
        }

        entries.sort_by_key(|entry| entry.trigger_at);
        Ok(entries)
    }

    async fn reconcile_impl(
        &self,
        owner_id: &str,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileSummary> {
        let now_local = self.now_local();
        let reminders = self.repository.load_active_reminders(owner_id)?;
        info!(
            "[Reconcile] {:?} pass over {} active reminders",
            trigger,
            reminders.len()
        );

        let mut summary = ReconcileSummary::default();
        for reminder in reminders {
            summary.examined += 1;
            let mut action = plan_repair(&reminder, &now_local);

            // A fresh exact-alarm grant moves degraded Alarm reminders
            // back onto the exact path even when the instant matches.
            if trigger == ReconcileTrigger::PermissionChanged
                && action == RepairAction::None
                && reminder.mode == ReminderMode::Alarm
                && !reminder.notification_handles.is_empty()
                && self.alarm_scheduler.can_schedule_exact()
            {
                if let Some(next) = reminder.next_trigger_at {
                    action = RepairAction::RescheduleDrifted { next };
                }
            }

            match self.apply_repair(&reminder, action, &mut summary).await {
                Ok(()) => {
                    self.repair_failures.lock().unwrap().remove(&reminder.id);
                }
                Err(err) => {
                    summary.repair_failures += 1;
                    let consecutive = {
                        let mut failures = self.repair_failures.lock().unwrap();
                        let count = failures.entry(reminder.id.clone()).or_insert(0);
                        *count += 1;
                        *count
                    };
                    warn!(
                        "[Reconcile] Repair failed for {} ({} in a row): {}",
                        reminder.id, consecutive, err
                    );
                    if consecutive >= REPAIR_FLAG_THRESHOLD {
                        summary.flagged += 1;
                        self.event_sink.emit(DomainEvent::ReminderRepairFlagged {
                            reminder_id: reminder.id.clone(),
                            consecutive_failures: consecutive,
                        });
                    }
                }
            }
        }

        info!(
            "[Reconcile] Pass done: {} fresh, {} rescheduled, {} implicit fires, {} cleared, {} failures",
            summary.scheduled_fresh,
            summary.rescheduled,
            summary.implicit_fires,
            summary.cleared,
            summary.repair_failures
        );
        Ok(summary)
    }

    async fn apply_repair(
        &self,
        reminder: &Reminder,
        action: RepairAction,
        summary: &mut ReconcileSummary,
    ) -> Result<()> {
        match action {
            RepairAction::None => Ok(()),
            RepairAction::ClearStaleHandles => {
                self.cancel_all(&reminder.notification_handles).await;
                self.repository
                    .update_handles(&reminder.id, vec![], None)
                    .await?;
                summary.cleared += 1;
                Ok(())
            }
            RepairAction::ScheduleFresh { next } => {
                self.arm(reminder, next).await?;
                summary.scheduled_fresh += 1;
                self.emit_state(&self.repository.load_reminder(&reminder.id)?);
                Ok(())
            }
            RepairAction::RescheduleDrifted { next } => {
                self.cancel_all(&reminder.notification_handles).await;
                self.arm(reminder, next).await?;
                summary.rescheduled += 1;
                Ok(())
            }
            RepairAction::ImplicitFire { scheduled_at } => {
                // The app was killed through the fire; record it so the
                // occurrence is not silently skipped, then re-arm.
                summary.implicit_fires += 1;
                self.record_fired_impl(&reminder.id, Some(scheduled_at)).await
            }
        }
    }
}

#[async_trait]
impl ReminderServiceTrait for ReminderService {
    async fn create_reminder(&self, new_reminder: NewReminder) -> Result<CreateReminderOutcome> {
        self.create_reminder_impl(new_reminder).await
    }

    async fn update_reminder(&self, update: ReminderUpdate) -> Result<Reminder> {
        self.update_reminder_impl(update).await
    }

    async fn cancel_reminder(&self, reminder_id: &str) -> Result<()> {
        self.cancel_reminder_impl(reminder_id).await
    }

    async fn delete_reminder(&self, reminder_id: &str) -> Result<()> {
        self.delete_reminder_impl(reminder_id).await
    }

    async fn complete(&self, target: CompletionTarget) -> Result<CompletionOutcome> {
        self.complete_impl(target).await
    }

    async fn record_fired(
        &self,
        reminder_id: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.record_fired_impl(reminder_id, scheduled_at).await
    }

    fn list_upcoming(&self, owner_id: &str) -> Result<Vec<UpcomingEntry>> {
        self.list_upcoming_impl(owner_id)
    }

    async fn reconcile(
        &self,
        owner_id: &str,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileSummary> {
        self.reconcile_impl(owner_id, trigger).await
    }
}

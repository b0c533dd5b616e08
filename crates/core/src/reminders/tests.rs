//! Engine-level tests wiring the lifecycle manager against in-memory
//! repository/scheduler fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::errors::{Error, Result, SchedulingError};
use crate::events::{DomainEvent, DomainEventSink};
use crate::utils::time_utils::Clock;

use super::{
    CompletionOutcome, CompletionTarget, DeliveryEvent, DeliveryListener, DeviceSchedulerTrait,
    NewReminder, NotificationPayload, OccurrenceUpsert, ReconcileTrigger, Reminder, ReminderKind,
    ReminderMode, ReminderOccurrence, ReminderPattern, ReminderRepositoryTrait, ReminderService,
    ReminderServiceTrait, ReminderState, ReminderUpdate, TriggerSpec, WeekdaySet,
};

// ─── Fakes ───────────────────────────────────────────────────────────────

struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: Mutex<FixedOffset>,
}

impl FixedClock {
    fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset: Mutex::new(offset),
        }
    }

    fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    fn set_offset(&self, offset: FixedOffset) {
        *self.offset.lock().unwrap() = offset;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn local_offset(&self) -> FixedOffset {
        *self.offset.lock().unwrap()
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<DomainEvent>>);

impl RecordingSink {
    fn events(&self) -> Vec<DomainEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl DomainEventSink for RecordingSink {
    fn emit(&self, event: DomainEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct MockRepository {
    reminders: Mutex<HashMap<String, Reminder>>,
    occurrences: Mutex<Vec<ReminderOccurrence>>,
}

impl MockRepository {
    fn reminder(&self, id: &str) -> Reminder {
        self.reminders.lock().unwrap().get(id).cloned().expect("reminder in store")
    }

    fn occurrence_count(&self, reminder_id: &str) -> usize {
        self.occurrences
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.reminder_id == reminder_id)
            .count()
    }

    fn occurrences_for(&self, reminder_id: &str) -> Vec<ReminderOccurrence> {
        self.occurrences
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.reminder_id == reminder_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReminderRepositoryTrait for MockRepository {
    fn load_active_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>> {
        Ok(self
            .reminders
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.owner_id == owner_id && r.canceled_at.is_none() && r.completed_at.is_none()
            })
            .cloned()
            .collect())
    }

    fn load_reminder(&self, reminder_id: &str) -> Result<Reminder> {
        self.reminders
            .lock()
            .unwrap()
            .get(reminder_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(reminder_id.to_string()))
    }

    async fn insert_reminder(&self, new_reminder: NewReminder) -> Result<Reminder> {
        let now = Utc::now();
        let reminder = Reminder {
            id: Uuid::new_v4().to_string(),
            owner_id: new_reminder.owner_id,
            title: new_reminder.title,
            body: new_reminder.body,
            kind: new_reminder.kind,
            pattern: new_reminder.pattern,
            mode: new_reminder.mode,
            notification_handles: vec![],
            next_trigger_at: None,
            delivered: false,
            completed_at: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.reminders
            .lock()
            .unwrap()
            .insert(reminder.id.clone(), reminder.clone());
        Ok(reminder)
    }

    async fn update_reminder(&self, mut reminder: Reminder) -> Result<Reminder> {
        reminder.updated_at = Utc::now();
        self.reminders
            .lock()
            .unwrap()
            .insert(reminder.id.clone(), reminder.clone());
        Ok(reminder)
    }

    async fn update_handles(
        &self,
        reminder_id: &str,
        handles: Vec<String>,
        next_trigger_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut reminders = self.reminders.lock().unwrap();
        let reminder = reminders
            .get_mut(reminder_id)
            .ok_or_else(|| Error::NotFound(reminder_id.to_string()))?;
        reminder.notification_handles = handles;
        reminder.next_trigger_at = next_trigger_at;
        Ok(())
    }

    async fn mark_delivered(&self, reminder_id: &str) -> Result<bool> {
        let mut reminders = self.reminders.lock().unwrap();
        let reminder = reminders
            .get_mut(reminder_id)
            .ok_or_else(|| Error::NotFound(reminder_id.to_string()))?;
        if reminder.delivered {
            return Ok(false);
        }
        reminder.delivered = true;
        Ok(true)
    }

    async fn complete_reminder(
        &self,
        reminder_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut reminders = self.reminders.lock().unwrap();
        let reminder = reminders
            .get_mut(reminder_id)
            .ok_or_else(|| Error::NotFound(reminder_id.to_string()))?;
        if reminder.completed_at.is_some() {
            return Ok(false);
        }
        reminder.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn complete_occurrence(
        &self,
        occurrence_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut occurrences = self.occurrences.lock().unwrap();
        let occurrence = occurrences
            .iter_mut()
            .find(|o| o.id == occurrence_id)
            .ok_or_else(|| Error::NotFound(occurrence_id.to_string()))?;
        if occurrence.completed_at.is_some() {
            return Ok(false);
        }
        occurrence.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn upsert_occurrence(
        &self,
        reminder_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<OccurrenceUpsert> {
        let mut occurrences = self.occurrences.lock().unwrap();
        if let Some(existing) = occurrences
            .iter()
            .find(|o| o.reminder_id == reminder_id && o.scheduled_at == scheduled_at)
        {
            return Ok(OccurrenceUpsert {
                occurrence: existing.clone(),
                created: false,
            });
        }
        let occurrence = ReminderOccurrence {
            id: Uuid::new_v4().to_string(),
            reminder_id: reminder_id.to_string(),
            scheduled_at,
            completed_at: None,
            created_at: Utc::now(),
        };
        occurrences.push(occurrence.clone());
        Ok(OccurrenceUpsert {
            occurrence,
            created: true,
        })
    }

    fn load_occurrences(&self, reminder_id: &str) -> Result<Vec<ReminderOccurrence>> {
        Ok(self.occurrences_for(reminder_id))
    }

    fn load_occurrence(&self, occurrence_id: &str) -> Result<ReminderOccurrence> {
        self.occurrences
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == occurrence_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(occurrence_id.to_string()))
    }

    fn load_pending_occurrences(&self, owner_id: &str) -> Result<Vec<ReminderOccurrence>> {
        let reminders = self.reminders.lock().unwrap();
        Ok(self
            .occurrences
            .lock()
            .unwrap()
            .iter()
            .filter(|o| {
                o.completed_at.is_none()
                    && reminders
                        .get(&o.reminder_id)
                        .is_some_and(|r| r.owner_id == owner_id)
            })
            .cloned()
            .collect())
    }

    async fn cancel_reminder(&self, reminder_id: &str, canceled_at: DateTime<Utc>) -> Result<()> {
        let mut reminders = self.reminders.lock().unwrap();
        let reminder = reminders
            .get_mut(reminder_id)
            .ok_or_else(|| Error::NotFound(reminder_id.to_string()))?;
        reminder.canceled_at = Some(canceled_at);
        Ok(())
    }

    async fn delete_reminder(&self, reminder_id: &str) -> Result<usize> {
        let removed = self.reminders.lock().unwrap().remove(reminder_id);
        self.occurrences
            .lock()
            .unwrap()
            .retain(|o| o.reminder_id != reminder_id);
        Ok(usize::from(removed.is_some()))
    }
}

#[derive(Default)]
struct MockScheduler {
    attempts: AtomicUsize,
    fail_times: AtomicUsize,
    repeating: bool,
    exact: AtomicBool,
    grant_on_request: bool,
    counter: AtomicUsize,
    live: Mutex<Vec<String>>,
    canceled: Mutex<Vec<String>>,
    gate_armed: AtomicBool,
    gate_entered: Arc<Notify>,
    gate_release: Arc<Notify>,
}

impl MockScheduler {
    fn live_handles(&self) -> Vec<String> {
        self.live.lock().unwrap().clone()
    }

    fn canceled_handles(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }

    fn fail_next(&self, times: usize) {
        self.fail_times.store(times, Ordering::SeqCst);
    }

    /// Arms a one-shot gate: the next `schedule` call signals
    /// `gate_entered` and parks until `gate_release`.
    fn arm_gate(&self) {
        self.gate_armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceSchedulerTrait for MockScheduler {
    async fn schedule(
        &self,
        trigger: &TriggerSpec,
        payload: &NotificationPayload,
    ) -> Result<Vec<String>> {
        if self.gate_armed.swap(false, Ordering::SeqCst) {
            self.gate_entered.notify_one();
            self.gate_release.notified().await;
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Scheduling(SchedulingError::registration_failed(
                &payload.reminder_id,
                "injected failure",
            )));
        }
        let fanout = match trigger {
            TriggerSpec::Weekly { weekdays, .. } => weekdays.len(),
            _ => 1,
        };
        let mut handles = Vec::with_capacity(fanout);
        for _ in 0..fanout {
            let id = self.counter.fetch_add(1, Ordering::SeqCst);
            handles.push(format!("handle-{id}"));
        }
        self.live.lock().unwrap().extend(handles.iter().cloned());
        Ok(handles)
    }

    async fn cancel(&self, handle: &str) -> Result<()> {
        self.live.lock().unwrap().retain(|h| h != handle);
        self.canceled.lock().unwrap().push(handle.to_string());
        Ok(())
    }

    fn supports_repeating(&self) -> bool {
        self.repeating
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact.load(Ordering::SeqCst)
    }

    async fn request_exact_permission(&self) -> Result<bool> {
        if self.grant_on_request {
            self.exact.store(true, Ordering::SeqCst);
        }
        Ok(self.grant_on_request)
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────

struct Harness {
    service: Arc<ReminderService>,
    repository: Arc<MockRepository>,
    scheduler: Arc<MockScheduler>,
    alarm: Arc<MockScheduler>,
    clock: Arc<FixedClock>,
    sink: Arc<RecordingSink>,
}

fn tz_east() -> FixedOffset {
    FixedOffset::east_opt(2 * 3600).unwrap()
}

/// Tuesday 2026-03-03 08:00 local (+02:00).
fn tuesday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 3, 6, 0, 0).unwrap()
}

fn harness() -> Harness {
    let repository = Arc::new(MockRepository::default());
    let scheduler = Arc::new(MockScheduler::default());
    let alarm = Arc::new(MockScheduler {
        exact: AtomicBool::new(true),
        ..MockScheduler::default()
    });
    let clock = Arc::new(FixedClock::new(tuesday_morning(), tz_east()));
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(
        ReminderService::new(repository.clone(), scheduler.clone(), alarm.clone())
            .with_clock(clock.clone())
            .with_event_sink(sink.clone()),
    );
    Harness {
        service,
        repository,
        scheduler,
        alarm,
        clock,
        sink,
    }
}

fn weekly_mon_wed(owner: &str) -> NewReminder {
    NewReminder {
        owner_id: owner.to_string(),
        title: "Gym session".to_string(),
        body: Some("Leg day".to_string()),
        kind: ReminderKind::Custom,
        pattern: ReminderPattern::Weekly {
            at_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            weekdays: WeekdaySet::from_days(&[1, 3]).unwrap(),
        },
        mode: ReminderMode::Normal,
    }
}

fn daily_seven(owner: &str) -> NewReminder {
    NewReminder {
        owner_id: owner.to_string(),
        title: "Log weight".to_string(),
        body: None,
        kind: ReminderKind::Local,
        pattern: ReminderPattern::Daily {
            at_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        },
        mode: ReminderMode::Normal,
    }
}

/// Wednesday 2026-03-04 07:00 local (+02:00) as UTC.
fn wednesday_seven_utc() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 5, 0, 0).unwrap()
}

// ─── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn weekly_create_schedules_first_trigger() {
    let h = harness();
    let outcome = h
        .service
        .create_reminder(weekly_mon_wed("user-1"))
        .await
        .expect("create");

    assert_eq!(outcome.state, ReminderState::Scheduled);
    assert!(!outcome.scheduling_degraded);
    // Created Tuesday 08:00 local, Mon/Wed at 07:00 -> next Wednesday 07:00.
    assert_eq!(outcome.reminder.next_trigger_at, Some(wednesday_seven_utc()));
    // Custom weekly fan-out: one handle per selected weekday.
    assert_eq!(outcome.reminder.notification_handles.len(), 2);

    let stored = h.repository.reminder(&outcome.reminder.id);
    assert_eq!(stored.notification_handles, outcome.reminder.notification_handles);
    assert_eq!(stored.next_trigger_at, Some(wednesday_seven_utc()));
    assert_eq!(h.scheduler.live_handles().len(), 2);
}

#[tokio::test]
async fn fire_materializes_occurrence_and_rearms() {
    let h = harness();
    let created = h
        .service
        .create_reminder(weekly_mon_wed("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    let old_handles = created.reminder.notification_handles.clone();

    h.clock.set_now(wednesday_seven_utc());
    h.service.record_fired(&id, None).await.expect("fire");

    let occurrences = h.repository.occurrences_for(&id);
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].scheduled_at, wednesday_seven_utc());
    assert_eq!(occurrences[0].completed_at, None);

    // Re-armed for the following Monday 07:00 local.
    let stored = h.repository.reminder(&id);
    assert_eq!(
        stored.next_trigger_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 9, 5, 0, 0).unwrap())
    );
    assert_eq!(stored.notification_handles.len(), 2);
    for handle in &old_handles {
        assert!(h.scheduler.canceled_handles().contains(handle));
        assert!(!stored.notification_handles.contains(handle));
    }
}

#[tokio::test]
async fn duplicate_fire_creates_one_occurrence_and_one_rearm() {
    let h = harness();
    let created = h
        .service
        .create_reminder(weekly_mon_wed("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    h.clock.set_now(wednesday_seven_utc());
    let fired_at = wednesday_seven_utc();
    h.service
        .record_fired(&id, Some(fired_at))
        .await
        .expect("first fire");
    let attempts_after_first = h.scheduler.attempts.load(Ordering::SeqCst);

    h.service
        .record_fired(&id, Some(fired_at))
        .await
        .expect("duplicate fire");

    assert_eq!(h.repository.occurrence_count(&id), 1);
    assert_eq!(h.scheduler.attempts.load(Ordering::SeqCst), attempts_after_first);
}

#[tokio::test]
async fn completion_is_idempotent() {
    let h = harness();
    let created = h
        .service
        .create_reminder(weekly_mon_wed("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    h.clock.set_now(wednesday_seven_utc());
    h.service.record_fired(&id, None).await.expect("fire");
    let occurrence_id = h.repository.occurrences_for(&id)[0].id.clone();

    let first = h
        .service
        .complete(CompletionTarget::Occurrence(occurrence_id.clone()))
        .await
        .expect("complete");
    assert_eq!(first, CompletionOutcome::Completed);
    let completed_at = h.repository.occurrences_for(&id)[0].completed_at;
    assert!(completed_at.is_some());

    h.clock
        .set_now(wednesday_seven_utc() + chrono::Duration::minutes(10));
    let second = h
        .service
        .complete(CompletionTarget::Occurrence(occurrence_id))
        .await
        .expect("repeat complete");
    assert_eq!(second, CompletionOutcome::AlreadyCompleted);
    assert_eq!(h.repository.occurrences_for(&id)[0].completed_at, completed_at);
}

#[tokio::test]
async fn one_time_fire_is_delivery_not_completion() {
    let h = harness();
    let created = h
        .service
        .create_reminder(NewReminder {
            owner_id: "user-1".to_string(),
            title: "Renew pass".to_string(),
            body: None,
            kind: ReminderKind::Local,
            pattern: ReminderPattern::OneTime {
                at: Utc.with_ymd_and_hms(2026, 3, 3, 17, 0, 0).unwrap(),
            },
            mode: ReminderMode::Normal,
        })
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    h.clock
        .set_now(Utc.with_ymd_and_hms(2026, 3, 3, 17, 0, 0).unwrap());
    h.service.record_fired(&id, None).await.expect("fire");

    let stored = h.repository.reminder(&id);
    assert!(stored.delivered);
    assert_eq!(stored.completed_at, None);
    assert_eq!(stored.state(), ReminderState::Fired);
    assert!(stored.notification_handles.is_empty());

    let outcome = h
        .service
        .complete(CompletionTarget::Reminder(id.clone()))
        .await
        .expect("complete");
    assert_eq!(outcome, CompletionOutcome::Completed);
    assert_eq!(h.repository.reminder(&id).state(), ReminderState::Completed);
}

#[tokio::test]
async fn alarm_mode_without_permission_degrades_to_normal() {
    let h = harness();
    h.alarm.exact.store(false, Ordering::SeqCst);

    let outcome = h
        .service
        .create_reminder(NewReminder {
            owner_id: "user-1".to_string(),
            title: "Medication".to_string(),
            body: None,
            kind: ReminderKind::Local,
            pattern: ReminderPattern::OneTime {
                at: Utc.with_ymd_and_hms(2026, 3, 3, 17, 0, 0).unwrap(),
            },
            mode: ReminderMode::Alarm,
        })
        .await
        .expect("create succeeds degraded");

    assert!(outcome.scheduling_degraded);
    assert_eq!(outcome.state, ReminderState::Scheduled);
    // The handle landed on the normal path, not the alarm path.
    assert_eq!(h.alarm.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(h.scheduler.attempts.load(Ordering::SeqCst), 1);
    assert!(h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, DomainEvent::ReminderSchedulingDegraded { .. })));
}

#[tokio::test]
async fn schedule_failure_is_retried_once() {
    let h = harness();
    h.scheduler.fail_next(1);

    let outcome = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("second attempt succeeds");
    assert_eq!(h.scheduler.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.state, ReminderState::Scheduled);
}

#[tokio::test]
async fn persistent_schedule_failure_leaves_record_pending() {
    let h = harness();
    h.scheduler.fail_next(2);

    let err = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect_err("both attempts fail");
    assert!(matches!(err, Error::Scheduling(_)));

    // Record exists, visibly unscheduled.
    let reminders = h.repository.load_active_reminders("user-1").expect("load");
    assert_eq!(reminders.len(), 1);
    assert!(reminders[0].notification_handles.is_empty());
    assert_eq!(reminders[0].state(), ReminderState::Draft);
}

#[tokio::test]
async fn edit_failure_keeps_pre_edit_handle_list() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    let pre_edit = created.reminder.notification_handles.clone();

    h.scheduler.fail_next(2);
    let err = h
        .service
        .update_reminder(ReminderUpdate {
            id: id.clone(),
            title: "Log weight (morning)".to_string(),
            body: None,
            pattern: ReminderPattern::Daily {
                at_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            },
            mode: ReminderMode::Normal,
        })
        .await
        .expect_err("schedule fails");
    assert!(matches!(err, Error::Scheduling(_)));

    // Stored record is the pre-edit one: old title, old handle list.
    let stored = h.repository.reminder(&id);
    assert_eq!(stored.title, "Log weight");
    assert_eq!(stored.notification_handles, pre_edit);
}

#[tokio::test]
async fn successful_edit_replaces_handles_atomically() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    let pre_edit = created.reminder.notification_handles.clone();

    let updated = h
        .service
        .update_reminder(ReminderUpdate {
            id: id.clone(),
            title: "Log weight (evening)".to_string(),
            body: None,
            pattern: ReminderPattern::Daily {
                at_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            },
            mode: ReminderMode::Normal,
        })
        .await
        .expect("edit");

    assert_eq!(updated.title, "Log weight (evening)");
    assert_ne!(updated.notification_handles, pre_edit);
    for handle in &pre_edit {
        assert!(h.scheduler.canceled_handles().contains(handle));
    }
    // New trigger: today 21:00 local (+02) = 19:00 UTC.
    assert_eq!(
        updated.next_trigger_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 3, 19, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn reconciliation_reschedules_after_timezone_jump() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    // Armed under +02:00: tomorrow 07:00 local = 05:00 UTC.
    assert_eq!(
        created.reminder.next_trigger_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 4, 5, 0, 0).unwrap())
    );

    // Device lands in UTC-5; local time is now Tuesday 01:00.
    h.clock.set_offset(FixedOffset::west_opt(5 * 3600).unwrap());
    let summary = h
        .service
        .reconcile("user-1", ReconcileTrigger::TimezoneChanged)
        .await
        .expect("reconcile");

    assert_eq!(summary.rescheduled, 1);
    let stored = h.repository.reminder(&id);
    // 07:00 at -05:00 is 12:00 UTC, still on Tuesday.
    assert_eq!(
        stored.next_trigger_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap())
    );
    for handle in &created.reminder.notification_handles {
        assert!(h.scheduler.canceled_handles().contains(handle));
    }

    // A second pass finds nothing to repair.
    let second = h
        .service
        .reconcile("user-1", ReconcileTrigger::ForegroundResume)
        .await
        .expect("reconcile again");
    assert_eq!(second.rescheduled, 0);
    assert_eq!(second.scheduled_fresh, 0);
}

#[tokio::test]
async fn reconciliation_rearms_after_reinstall() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    // Simulate a reinstall: recorded handles are gone.
    h.repository
        .update_handles(&id, vec![], None)
        .await
        .expect("clear");

    let summary = h
        .service
        .reconcile("user-1", ReconcileTrigger::ColdStart)
        .await
        .expect("reconcile");
    assert_eq!(summary.scheduled_fresh, 1);
    let stored = h.repository.reminder(&id);
    assert!(!stored.notification_handles.is_empty());
    assert!(stored.next_trigger_at.is_some());
}

#[tokio::test]
async fn reconciliation_fires_implicitly_when_killed_through_trigger() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    let promised = created.reminder.next_trigger_at.expect("armed");

    // App comes back an hour after the promised instant.
    h.clock.set_now(promised + chrono::Duration::hours(1));
    let summary = h
        .service
        .reconcile("user-1", ReconcileTrigger::ColdStart)
        .await
        .expect("reconcile");

    assert_eq!(summary.implicit_fires, 1);
    let occurrences = h.repository.occurrences_for(&id);
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].scheduled_at, promised);
    // Re-armed past the missed slot.
    let stored = h.repository.reminder(&id);
    assert!(stored.next_trigger_at.expect("re-armed") > promised);
}

#[tokio::test]
async fn repeated_repair_failures_flag_the_reminder() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    h.repository
        .update_handles(&id, vec![], None)
        .await
        .expect("clear");

    h.scheduler.fail_next(100);
    let first = h
        .service
        .reconcile("user-1", ReconcileTrigger::ColdStart)
        .await
        .expect("pass runs");
    assert_eq!(first.repair_failures, 1);
    assert_eq!(first.flagged, 0);

    let second = h
        .service
        .reconcile("user-1", ReconcileTrigger::ForegroundResume)
        .await
        .expect("pass runs");
    assert_eq!(second.repair_failures, 1);
    assert_eq!(second.flagged, 1);
    assert!(h.sink.events().iter().any(|e| matches!(
        e,
        DomainEvent::ReminderRepairFlagged { reminder_id, .. } if *reminder_id == id
    )));
}

#[tokio::test]
async fn concurrent_edit_is_rejected() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    h.scheduler.arm_gate();
    let entered = h.scheduler.gate_entered.clone();
    let release = h.scheduler.gate_release.clone();

    let service = h.service.clone();
    let edit_id = id.clone();
    let edit = tokio::spawn(async move {
        service
            .update_reminder(ReminderUpdate {
                id: edit_id,
                title: "Edited".to_string(),
                body: None,
                pattern: ReminderPattern::Daily {
                    at_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                },
                mode: ReminderMode::Normal,
            })
            .await
    });
    entered.notified().await;

    let err = h
        .service
        .update_reminder(ReminderUpdate {
            id: id.clone(),
            title: "Racing edit".to_string(),
            body: None,
            pattern: ReminderPattern::Daily {
                at_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            },
            mode: ReminderMode::Normal,
        })
        .await
        .expect_err("reentrant edit");
    assert!(matches!(err, Error::ConcurrentModification(_)));

    release.notify_one();
    edit.await.expect("join").expect("first edit succeeds");
    assert_eq!(h.repository.reminder(&id).title, "Edited");
}

#[tokio::test]
async fn cancel_during_in_flight_edit_discards_schedule_result() {
    let h = harness();
    let created = h
        .service
        .create_reminder(daily_seven("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    h.scheduler.arm_gate();
    let entered = h.scheduler.gate_entered.clone();
    let release = h.scheduler.gate_release.clone();

    let service = h.service.clone();
    let edit_id = id.clone();
    let edit = tokio::spawn(async move {
        service
            .update_reminder(ReminderUpdate {
                id: edit_id,
                title: "Edited".to_string(),
                body: None,
                pattern: ReminderPattern::Daily {
                    at_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                },
                mode: ReminderMode::Normal,
            })
            .await
    });
    entered.notified().await;

    // Cancel lands mid-edit: deferred, not an error.
    h.service.cancel_reminder(&id).await.expect("deferred cancel");

    release.notify_one();
    edit.await.expect("join").expect("edit settles");

    let stored = h.repository.reminder(&id);
    assert_eq!(stored.state(), ReminderState::Canceled);
    assert!(stored.notification_handles.is_empty());
    assert!(h.scheduler.live_handles().is_empty());
}

#[tokio::test]
async fn broadcast_delivery_marks_global_reminder_once() {
    let h = harness();
    let created = h
        .service
        .create_reminder(NewReminder {
            owner_id: "user-1".to_string(),
            title: "Maintenance tonight".to_string(),
            body: Some("Service window 22:00".to_string()),
            kind: ReminderKind::Global,
            pattern: ReminderPattern::OneTime {
                at: Utc.with_ymd_and_hms(2026, 3, 3, 20, 0, 0).unwrap(),
            },
            mode: ReminderMode::Normal,
        })
        .await
        .expect("create");
    let id = created.reminder.id.clone();

    // Broadcasts ride the push channel, never the device scheduler.
    assert_eq!(h.scheduler.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(created.state, ReminderState::Scheduled);

    let listener = DeliveryListener::new(h.service.clone());
    listener
        .dispatch(DeliveryEvent::BroadcastDelivered {
            reminder_id: id.clone(),
        })
        .await
        .expect("dispatch");
    assert!(h.repository.reminder(&id).delivered);

    // At-least-once push delivery: the second broadcast is absorbed.
    listener
        .dispatch(DeliveryEvent::BroadcastDelivered {
            reminder_id: id.clone(),
        })
        .await
        .expect("duplicate dispatch");
    assert_eq!(h.repository.reminder(&id).state(), ReminderState::Fired);
}

#[tokio::test]
async fn upcoming_feed_is_ordered_by_trigger_instant() {
    let h = harness();
    let weekly = h
        .service
        .create_reminder(weekly_mon_wed("user-1"))
        .await
        .expect("create weekly");
    let one_time = h
        .service
        .create_reminder(NewReminder {
            owner_id: "user-1".to_string(),
            title: "Call dentist".to_string(),
            body: None,
            kind: ReminderKind::Local,
            pattern: ReminderPattern::OneTime {
                at: Utc.with_ymd_and_hms(2026, 3, 3, 15, 0, 0).unwrap(),
            },
            mode: ReminderMode::Normal,
        })
        .await
        .expect("create one-time");

    let entries = h.service.list_upcoming("user-1").expect("list");
    assert_eq!(entries.len(), 2);
    // One-time today 15:00 UTC sorts before weekly Wednesday 05:00 UTC.
    assert_eq!(entries[0].reminder.id, one_time.reminder.id);
    assert_eq!(entries[1].reminder.id, weekly.reminder.id);

    // A fired, unacknowledged occurrence joins the feed at its instant.
    h.clock.set_now(wednesday_seven_utc());
    h.service
        .record_fired(&weekly.reminder.id, None)
        .await
        .expect("fire");
    let entries = h.service.list_upcoming("user-1").expect("list again");
    assert!(entries
        .iter()
        .any(|e| e.occurrence.is_some() && e.trigger_at == wednesday_seven_utc()));
}

#[tokio::test]
async fn standing_registrations_are_not_rearmed_on_fire() {
    let repository = Arc::new(MockRepository::default());
    let scheduler = Arc::new(MockScheduler {
        repeating: true,
        ..MockScheduler::default()
    });
    let alarm = Arc::new(MockScheduler::default());
    let clock = Arc::new(FixedClock::new(tuesday_morning(), tz_east()));
    let service = ReminderService::new(repository.clone(), scheduler.clone(), alarm)
        .with_clock(clock.clone());

    let created = service
        .create_reminder(weekly_mon_wed("user-1"))
        .await
        .expect("create");
    let id = created.reminder.id.clone();
    let handles = created.reminder.notification_handles.clone();

    clock.set_now(wednesday_seven_utc());
    service.record_fired(&id, None).await.expect("fire");

    // The platform keeps firing the standing registration; handles stay.
    let stored = repository.reminder(&id);
    assert_eq!(stored.notification_handles, handles);
    assert_eq!(scheduler.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(repository.occurrence_count(&id), 1);
    // Bookkeeping still advances to the next slot.
    assert_eq!(
        stored.next_trigger_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 9, 5, 0, 0).unwrap())
    );
}

//! Recurrence resolution: pattern + reference instant -> next trigger.
//!
//! Pure and deterministic: callers supply `after` (normally "now") and the
//! timezone rides in on the `DateTime` itself. On a device timezone change
//! the caller re-resolves under the new offset; previously promised
//! wall-clock slots are not preserved.

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDateTime, NaiveTime, TimeZone};

use super::reminders_model::{ReminderPattern, WeekdaySet};

/// Upper bound on the day scan for weekly patterns: candidates in the
/// current and the next week, with slack for DST gaps.
const WEEKLY_SCAN_DAYS: u64 = 14;

/// Next concrete trigger instant for `pattern` relative to `after`.
///
/// `OneTime` returns its instant only while still in the future; `None`
/// means the instant has elapsed and the caller decides whether to fire
/// immediately or drop. `Daily` returns the next instant at `at_time`
/// local, at `after` itself when the time-of-day matches exactly. `Weekly`
/// returns the earliest selected-weekday instant strictly after `after`.
pub fn next_trigger<Tz: TimeZone>(
    pattern: &ReminderPattern,
    after: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    match pattern {
        ReminderPattern::OneTime { at } => {
            let at = at.with_timezone(&after.timezone());
            (at > *after).then_some(at)
        }
        ReminderPattern::Daily { at_time } => next_daily(*at_time, after),
        ReminderPattern::Weekly { at_time, weekdays } => next_weekly(*at_time, weekdays, after),
    }
}

fn next_daily<Tz: TimeZone>(at_time: NaiveTime, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tz = after.timezone();
    let mut date = after.date_naive();
    if after.time() > at_time {
        date = date.succ_opt()?;
    }
    // A nonexistent local time (DST gap) skips to the next day's slot.
    for _ in 0..3 {
        if let Some(candidate) = resolve_local(&tz, date.and_time(at_time)) {
            if candidate >= *after {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

fn next_weekly<Tz: TimeZone>(
    at_time: NaiveTime,
    weekdays: &WeekdaySet,
    after: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = after.timezone();
    let start = after.date_naive();
    for offset in 0..=WEEKLY_SCAN_DAYS {
        let date = start.checked_add_days(Days::new(offset))?;
        if !weekdays.contains(date.weekday()) {
            continue;
        }
        if let Some(candidate) = resolve_local(&tz, date.and_time(at_time)) {
            if candidate > *after {
                return Some(candidate);
            }
        }
    }
    None
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Some(instant),
        // DST fold: the earlier of the two instants wins.
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

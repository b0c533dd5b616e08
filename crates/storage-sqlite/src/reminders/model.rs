//! Database models for reminder tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use tracklet_core::errors::{Error, Result};
use tracklet_core::reminders::{
    Reminder, ReminderKind, ReminderMode, ReminderOccurrence, ReminderPattern,
};
use tracklet_core::utils::time_utils::{parse_rfc3339, to_rfc3339};

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::reminders)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReminderDB {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub body: Option<String>,
    pub kind: String,
    pub pattern: String,
    pub mode: String,
    pub notification_handles: String,
    pub next_trigger_at: Option<String>,
    pub delivered: i32,
    pub completed_at: Option<String>,
    pub canceled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::reminder_occurrences)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReminderOccurrenceDB {
    pub id: String,
    pub reminder_id: String,
    pub scheduled_at: String,
    pub completed_at: Option<String>,
    pub created_at: String,
}

impl ReminderDB {
    pub fn from_domain(reminder: &Reminder) -> Result<Self> {
        Ok(Self {
            id: reminder.id.clone(),
            owner_id: reminder.owner_id.clone(),
            title: reminder.title.clone(),
            body: reminder.body.clone(),
            kind: enum_to_db(&reminder.kind)?,
            pattern: serde_json::to_string(&reminder.pattern)?,
            mode: enum_to_db(&reminder.mode)?,
            notification_handles: serde_json::to_string(&reminder.notification_handles)?,
            next_trigger_at: reminder.next_trigger_at.as_ref().map(to_rfc3339),
            delivered: i32::from(reminder.delivered),
            completed_at: reminder.completed_at.as_ref().map(to_rfc3339),
            canceled_at: reminder.canceled_at.as_ref().map(to_rfc3339),
            created_at: to_rfc3339(&reminder.created_at),
            updated_at: to_rfc3339(&reminder.updated_at),
        })
    }
}

impl TryFrom<ReminderDB> for Reminder {
    type Error = Error;

    fn try_from(row: ReminderDB) -> Result<Self> {
        let kind: ReminderKind = enum_from_db(&row.kind)?;
        let mode: ReminderMode = enum_from_db(&row.mode)?;
        let pattern: ReminderPattern = serde_json::from_str(&row.pattern)?;
        let notification_handles: Vec<String> = serde_json::from_str(&row.notification_handles)?;
        Ok(Reminder {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            body: row.body,
            kind,
            pattern,
            mode,
            notification_handles,
            next_trigger_at: row.next_trigger_at.as_deref().map(parse_rfc3339).transpose()?,
            delivered: row.delivered != 0,
            completed_at: row.completed_at.as_deref().map(parse_rfc3339).transpose()?,
            canceled_at: row.canceled_at.as_deref().map(parse_rfc3339).transpose()?,
            created_at: parse_rfc3339(&row.created_at)?,
            updated_at: parse_rfc3339(&row.updated_at)?,
        })
    }
}

impl TryFrom<ReminderOccurrenceDB> for ReminderOccurrence {
    type Error = Error;

    fn try_from(row: ReminderOccurrenceDB) -> Result<Self> {
        Ok(ReminderOccurrence {
            id: row.id,
            reminder_id: row.reminder_id,
            scheduled_at: parse_rfc3339(&row.scheduled_at)?,
            completed_at: row.completed_at.as_deref().map(parse_rfc3339).transpose()?,
            created_at: parse_rfc3339(&row.created_at)?,
        })
    }
}

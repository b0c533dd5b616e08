use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use uuid::Uuid;

use tracklet_core::errors::Error;
use tracklet_core::reminders::{
    NewReminder, OccurrenceUpsert, Reminder, ReminderOccurrence, ReminderRepositoryTrait,
};
use tracklet_core::utils::time_utils::to_rfc3339;
use tracklet_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{reminder_occurrences, reminders};

use super::model::{ReminderDB, ReminderOccurrenceDB};

pub struct ReminderRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ReminderRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        ReminderRepository { pool, writer }
    }

    fn load_reminder_impl(&self, reminder_id: &str) -> Result<Reminder> {
        let mut conn = get_connection(&self.pool)?;
        let row = reminders::table
            .find(reminder_id)
            .first::<ReminderDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .ok_or_else(|| Error::NotFound(reminder_id.to_string()))?;
        Reminder::try_from(row)
    }
}

#[async_trait]
impl ReminderRepositoryTrait for ReminderRepository {
    fn load_active_reminders(&self, owner_id: &str) -> Result<Vec<Reminder>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = reminders::table
            .filter(reminders::owner_id.eq(owner_id))
            .filter(reminders::canceled_at.is_null())
            .filter(reminders::completed_at.is_null())
            .order(reminders::created_at.asc())
            .load::<ReminderDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(Reminder::try_from).collect()
    }

    fn load_reminder(&self, reminder_id: &str) -> Result<Reminder> {
        self.load_reminder_impl(reminder_id)
    }

    async fn insert_reminder(&self, new_reminder: NewReminder) -> Result<Reminder> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Reminder> {
                let now = to_rfc3339(&Utc::now());
                let row = ReminderDB {
                    id: Uuid::new_v4().to_string(),
                    owner_id: new_reminder.owner_id,
                    title: new_reminder.title,
                    body: new_reminder.body,
                    kind: super::model::enum_to_db(&new_reminder.kind)?,
                    pattern: serde_json::to_string(&new_reminder.pattern)?,
                    mode: super::model::enum_to_db(&new_reminder.mode)?,
                    notification_handles: "[]".to_string(),
                    next_trigger_at: None,
                    delivered: 0,
                    completed_at: None,
                    canceled_at: None,
                    created_at: now.clone(),
                    updated_at: now,
                };

                let result_db = diesel::insert_into(reminders::table)
                    .values(&row)
                    .returning(ReminderDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                Reminder::try_from(result_db)
            })
            .await
    }

    async fn update_reminder(&self, reminder: Reminder) -> Result<Reminder> {
        let reminder_id = reminder.id.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Reminder> {
                let mut row = ReminderDB::from_domain(&reminder)?;
                row.updated_at = to_rfc3339(&Utc::now());

                diesel::insert_into(reminders::table)
                    .values(&row)
                    .on_conflict(reminders::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                let result_db = reminders::table
                    .find(&reminder_id)
                    .first::<ReminderDB>(conn)
                    .map_err(StorageError::from)?;
                Reminder::try_from(result_db)
            })
            .await
    }

    async fn update_handles(
        &self,
        reminder_id: &str,
        handles: Vec<String>,
        next_trigger_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let reminder_id = reminder_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let handles_json = serde_json::to_string(&handles)?;
                diesel::update(reminders::table.find(&reminder_id))
                    .set((
                        reminders::notification_handles.eq(handles_json),
                        reminders::next_trigger_at
                            .eq(next_trigger_at.as_ref().map(to_rfc3339)),
                        reminders::updated_at.eq(to_rfc3339(&Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_delivered(&self, reminder_id: &str) -> Result<bool> {
        let reminder_id = reminder_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let affected = diesel::update(
                    reminders::table
                        .find(&reminder_id)
                        .filter(reminders::delivered.eq(0)),
                )
                .set((
                    reminders::delivered.eq(1),
                    reminders::updated_at.eq(to_rfc3339(&Utc::now())),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    async fn complete_reminder(
        &self,
        reminder_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let reminder_id = reminder_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let affected = diesel::update(
                    reminders::table
                        .find(&reminder_id)
                        .filter(reminders::completed_at.is_null()),
                )
                .set((
                    reminders::completed_at.eq(Some(to_rfc3339(&completed_at))),
                    reminders::updated_at.eq(to_rfc3339(&Utc::now())),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    async fn complete_occurrence(
        &self,
        occurrence_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let occurrence_id = occurrence_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let affected = diesel::update(
                    reminder_occurrences::table
                        .find(&occurrence_id)
                        .filter(reminder_occurrences::completed_at.is_null()),
                )
                .set(reminder_occurrences::completed_at.eq(Some(to_rfc3339(&completed_at))))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    async fn upsert_occurrence(
        &self,
        reminder_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<OccurrenceUpsert> {
        let reminder_id = reminder_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<OccurrenceUpsert> {
                let scheduled = to_rfc3339(&scheduled_at);
                let row = ReminderOccurrenceDB {
                    id: Uuid::new_v4().to_string(),
                    reminder_id: reminder_id.clone(),
                    scheduled_at: scheduled.clone(),
                    completed_at: None,
                    created_at: to_rfc3339(&Utc::now()),
                };

                let inserted = diesel::insert_into(reminder_occurrences::table)
                    .values(&row)
                    .on_conflict((
                        reminder_occurrences::reminder_id,
                        reminder_occurrences::scheduled_at,
                    ))
                    .do_nothing()
                    .execute(conn)
                    .map_err(StorageError::from)?;

                let stored = reminder_occurrences::table
                    .filter(reminder_occurrences::reminder_id.eq(&reminder_id))
                    .filter(reminder_occurrences::scheduled_at.eq(&scheduled))
                    .first::<ReminderOccurrenceDB>(conn)
                    .map_err(StorageError::from)?;
                Ok(OccurrenceUpsert {
                    occurrence: ReminderOccurrence::try_from(stored)?,
                    created: inserted > 0,
                })
            })
            .await
    }

    fn load_occurrences(&self, reminder_id: &str) -> Result<Vec<ReminderOccurrence>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = reminder_occurrences::table
            .filter(reminder_occurrences::reminder_id.eq(reminder_id))
            .order(reminder_occurrences::scheduled_at.asc())
            .load::<ReminderOccurrenceDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(ReminderOccurrence::try_from).collect()
    }

    fn load_occurrence(&self, occurrence_id: &str) -> Result<ReminderOccurrence> {
        let mut conn = get_connection(&self.pool)?;
        let row = reminder_occurrences::table
            .find(occurrence_id)
            .first::<ReminderOccurrenceDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .ok_or_else(|| Error::NotFound(occurrence_id.to_string()))?;
        ReminderOccurrence::try_from(row)
    }

    fn load_pending_occurrences(&self, owner_id: &str) -> Result<Vec<ReminderOccurrence>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = reminder_occurrences::table
            .inner_join(reminders::table.on(reminders::id.eq(reminder_occurrences::reminder_id)))
            .filter(reminders::owner_id.eq(owner_id))
            .filter(reminder_occurrences::completed_at.is_null())
            .select(ReminderOccurrenceDB::as_select())
            .order(reminder_occurrences::scheduled_at.asc())
            .load::<ReminderOccurrenceDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(ReminderOccurrence::try_from).collect()
    }

    async fn cancel_reminder(&self, reminder_id: &str, canceled_at: DateTime<Utc>) -> Result<()> {
        let reminder_id = reminder_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(reminders::table.find(&reminder_id))
                    .set((
                        reminders::canceled_at.eq(Some(to_rfc3339(&canceled_at))),
                        reminders::updated_at.eq(to_rfc3339(&Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn delete_reminder(&self, reminder_id: &str) -> Result<usize> {
        let reminder_id = reminder_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let affected = diesel::delete(reminders::table.find(&reminder_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(affected)
            })
            .await
    }
}

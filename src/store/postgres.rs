//! Postgres store. Queries are bound at runtime so the crate builds
//! without a reachable database; the table layout is documented in
//! `migrations/0001_schedules.sql`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::schema::{Recipient, Schedule, ScheduleNotification};
use crate::store::{ScheduleStore, StoreError, StoreResult};

const SCHEDULE_COLUMNS: &str = "id, trainer_id, athlete_id, title, description, date, start_time, \
     end_time, duration_minutes, kind, status, location, is_online, meeting_link, \
     reminder_minutes, color, notes, athlete_confirmed, cancelled_reason, cancelled_by, \
     cancelled_at, recurrence, parent_schedule_id, occurrence_number, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, schedule_id, recipient_id, kind, channel, scheduled_for, \
     status, sent_at, last_error, attempt_count, additional_data, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

async fn insert_schedule_row<'e, E>(executor: E, s: &Schedule) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO schedules (id, trainer_id, athlete_id, title, description, date, \
         start_time, end_time, duration_minutes, kind, status, location, is_online, \
         meeting_link, reminder_minutes, color, notes, athlete_confirmed, cancelled_reason, \
         cancelled_by, cancelled_at, recurrence, parent_schedule_id, occurrence_number, \
         created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
         $18, $19, $20, $21, $22, $23, $24, $25, $26)",
    )
    .bind(s.id)
    .bind(s.trainer_id)
    .bind(s.athlete_id)
    .bind(&s.title)
    .bind(&s.description)
    .bind(s.date)
    .bind(s.start_time)
    .bind(s.end_time)
    .bind(s.duration_minutes)
    .bind(s.kind)
    .bind(s.status)
    .bind(&s.location)
    .bind(s.is_online)
    .bind(&s.meeting_link)
    .bind(s.reminder_minutes)
    .bind(&s.color)
    .bind(&s.notes)
    .bind(s.athlete_confirmed)
    .bind(&s.cancelled_reason)
    .bind(&s.cancelled_by)
    .bind(s.cancelled_at)
    .bind(s.recurrence.as_ref().map(sqlx::types::Json))
    .bind(s.parent_schedule_id)
    .bind(s.occurrence_number)
    .bind(s.created_at)
    .bind(s.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_notification_row<'e, E>(
    executor: E,
    n: &ScheduleNotification,
) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO schedule_notifications (id, schedule_id, recipient_id, kind, channel, \
         scheduled_for, status, sent_at, last_error, attempt_count, additional_data, \
         created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(n.id)
    .bind(n.schedule_id)
    .bind(n.recipient_id)
    .bind(n.kind)
    .bind(n.channel)
    .bind(n.scheduled_for)
    .bind(n.status)
    .bind(n.sent_at)
    .bind(&n.last_error)
    .bind(n.attempt_count)
    .bind(&n.additional_data)
    .bind(n.created_at)
    .bind(n.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn health_check(&self) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        insert_schedule_row(&self.pool, schedule).await?;
        Ok(())
    }

    async fn insert_schedules(&self, schedules: &[Schedule]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for schedule in schedules {
            insert_schedule_row(&mut *tx, schedule).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, Schedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_schedule(&self, s: &Schedule) -> StoreResult<()> {
        sqlx::query(
            "UPDATE schedules SET title = $2, description = $3, date = $4, start_time = $5, \
             end_time = $6, duration_minutes = $7, kind = $8, status = $9, location = $10, \
             is_online = $11, meeting_link = $12, reminder_minutes = $13, color = $14, \
             notes = $15, athlete_confirmed = $16, cancelled_reason = $17, cancelled_by = $18, \
             cancelled_at = $19, updated_at = $20 \
             WHERE id = $1",
        )
        .bind(s.id)
        .bind(&s.title)
        .bind(&s.description)
        .bind(s.date)
        .bind(s.start_time)
        .bind(s.end_time)
        .bind(s.duration_minutes)
        .bind(s.kind)
        .bind(s.status)
        .bind(&s.location)
        .bind(s.is_online)
        .bind(&s.meeting_link)
        .bind(s.reminder_minutes)
        .bind(&s.color)
        .bind(&s.notes)
        .bind(s.athlete_confirmed)
        .bind(&s.cancelled_reason)
        .bind(&s.cancelled_by)
        .bind(s.cancelled_at)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn schedules_for_trainer_on(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, Schedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE trainer_id = $1 AND date = $2 \
             ORDER BY start_time"
        ))
        .bind(trainer_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_notifications(&self, rows: &[ScheduleNotification]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            insert_notification_row(&mut *tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_notification(&self, n: &ScheduleNotification) -> StoreResult<()> {
        sqlx::query(
            "UPDATE schedule_notifications SET scheduled_for = $2, status = $3, sent_at = $4, \
             last_error = $5, attempt_count = $6, additional_data = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(n.id)
        .bind(n.scheduled_for)
        .bind(n.status)
        .bind(n.sent_at)
        .bind(&n.last_error)
        .bind(n.attempt_count)
        .bind(&n.additional_data)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduleNotification>> {
        let rows = sqlx::query_as::<_, ScheduleNotification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM schedule_notifications \
             WHERE status = 'pending' AND scheduled_for <= $1 \
             ORDER BY scheduled_for \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn notifications_for_schedule(
        &self,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<ScheduleNotification>> {
        let rows = sqlx::query_as::<_, ScheduleNotification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM schedule_notifications \
             WHERE schedule_id = $1 \
             ORDER BY scheduled_for"
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn cancel_pending_notifications(
        &self,
        schedule_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE schedule_notifications SET status = 'cancelled', updated_at = $2 \
             WHERE schedule_id = $1 AND status = 'pending'",
        )
        .bind(schedule_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_recipient(&self, id: Uuid) -> StoreResult<Option<Recipient>> {
        let row = sqlx::query_as::<_, Recipient>(
            "SELECT id, full_name AS name, email FROM athletes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

//! Persistence boundary for schedules and their notifications.
//!
//! Two implementations: [`PgStore`] against Postgres for production, and
//! [`MemoryStore`] for tests and local development. Services and the
//! dispatcher only see the trait.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::schema::{Recipient, Schedule, ScheduleNotification};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<bool>;

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    /// Insert a recurring batch atomically: either every row lands or none.
    async fn insert_schedules(&self, schedules: &[Schedule]) -> StoreResult<()>;

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>>;

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    /// Hard removal. Returns whether a row existed.
    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool>;

    /// Every schedule (any status) for one trainer on one calendar date.
    async fn schedules_for_trainer_on(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Schedule>>;

    async fn insert_notifications(&self, rows: &[ScheduleNotification]) -> StoreResult<()>;

    async fn update_notification(&self, row: &ScheduleNotification) -> StoreResult<()>;

    /// Pending rows whose `scheduled_for` has passed, oldest first.
    async fn due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduleNotification>>;

    async fn notifications_for_schedule(
        &self,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<ScheduleNotification>>;

    /// Flip a schedule's pending notifications to cancelled; sent and
    /// failed rows stay untouched as history. Returns the number flipped.
    async fn cancel_pending_notifications(
        &self,
        schedule_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn get_recipient(&self, id: Uuid) -> StoreResult<Option<Recipient>>;
}

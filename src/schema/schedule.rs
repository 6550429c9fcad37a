use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::recurrence::RecurringPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ScheduleType {
    Training,
    Consultation,
    Assessment,
    Recovery,
    GroupClass,
    Online,
    Other,
}

impl Default for ScheduleType {
    fn default() -> Self {
        ScheduleType::Training
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub athlete_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub kind: ScheduleType,
    pub status: ScheduleStatus,
    pub location: Option<String>,
    pub is_online: bool,
    pub meeting_link: Option<String>,
    pub reminder_minutes: i32,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub athlete_confirmed: bool,
    pub cancelled_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sqlx(json(nullable))]
    pub recurrence: Option<RecurringPattern>,
    pub parent_schedule_id: Option<Uuid>,
    pub occurrence_number: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ScheduleStatus::Cancelled
    }
}

/// Input shape for schedule creation. A present `recurrence` turns the
/// draft into the parent of a recurring series.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDraft {
    pub trainer_id: Uuid,
    pub athlete_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub kind: ScheduleType,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub reminder_minutes: i32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub recurrence: Option<RecurringPattern>,
}

/// Partial update; absent fields keep their current value. Cancellation is
/// a separate operation and not expressible through `status` here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub kind: Option<ScheduleType>,
    pub status: Option<ScheduleStatus>,
    pub location: Option<String>,
    pub is_online: Option<bool>,
    pub meeting_link: Option<String>,
    pub reminder_minutes: Option<i32>,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub athlete_confirmed: Option<bool>,
}

/// Contact projection of an athlete, resolved by the dispatcher when it
/// needs an address to send to. Athlete management lives outside this
/// service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

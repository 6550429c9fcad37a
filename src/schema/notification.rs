use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationType {
    Reminder,
    ConfirmationRequest,
    Cancellation,
    Reschedule,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Reminder => "reminder",
            NotificationType::ConfirmationRequest => "confirmation_request",
            NotificationType::Cancellation => "cancellation",
            NotificationType::Reschedule => "reschedule",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

/// One persisted, time-gated intent to send one email about a schedule.
/// `scheduled_for` gates dispatch eligibility; a value in the past makes
/// the row immediately due.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleNotification {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub channel: NotificationChannel,
    pub scheduled_for: DateTime<Utc>,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub attempt_count: i32,
    pub additional_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleNotification {
    pub fn new(
        schedule_id: Uuid,
        recipient_id: Uuid,
        kind: NotificationType,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            recipient_id,
            kind,
            channel: NotificationChannel::Email,
            scheduled_for,
            status: NotificationStatus::Pending,
            sent_at: None,
            last_error: None,
            attempt_count: 0,
            additional_data: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = data;
        self
    }
}

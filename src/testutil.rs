//! Shared builders for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::schema::{Recipient, Schedule, ScheduleDraft, ScheduleStatus, ScheduleType};
use crate::services::{EmailError, EmailGateway, OutboundEmail};

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn schedule_at(
    trainer_id: Uuid,
    on: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Schedule {
    let now = Utc::now();
    Schedule {
        id: Uuid::new_v4(),
        trainer_id,
        athlete_id: Uuid::new_v4(),
        title: "Strength block".to_string(),
        description: None,
        date: on,
        start_time: start,
        end_time: end,
        duration_minutes: (end - start).num_minutes() as i32,
        kind: ScheduleType::Training,
        status: ScheduleStatus::Scheduled,
        location: None,
        is_online: false,
        meeting_link: None,
        reminder_minutes: 0,
        color: None,
        notes: None,
        athlete_confirmed: false,
        cancelled_reason: None,
        cancelled_by: None,
        cancelled_at: None,
        recurrence: None,
        parent_schedule_id: None,
        occurrence_number: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn draft(trainer_id: Uuid, on: NaiveDate, start: NaiveTime, end: NaiveTime) -> ScheduleDraft {
    ScheduleDraft {
        trainer_id,
        athlete_id: Uuid::new_v4(),
        title: "Strength block".to_string(),
        description: None,
        date: on,
        start_time: start,
        end_time: end,
        kind: ScheduleType::Training,
        location: None,
        is_online: false,
        meeting_link: None,
        reminder_minutes: 0,
        color: None,
        notes: None,
        recurrence: None,
    }
}

pub fn recipient(id: Uuid) -> Recipient {
    Recipient {
        id,
        name: "Jo Athlete".to_string(),
        email: "jo@example.com".to_string(),
    }
}

/// Gateway that records every send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait::async_trait]
impl EmailGateway for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Gateway that fails the first `fail_times` sends, then succeeds.
pub struct FlakyMailer {
    remaining_failures: AtomicU32,
    pub sent: Mutex<Vec<OutboundEmail>>,
}

impl FlakyMailer {
    pub fn failing(times: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(times),
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl EmailGateway for FlakyMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EmailError::Transport("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

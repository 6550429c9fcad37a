use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};
use crate::schema::{NotificationType, Schedule, ScheduleNotification};
use crate::store::ScheduleStore;

/// Confirmation requests go out this long before the session.
pub const CONFIRMATION_LEAD_HOURS: i64 = 24;

/// Absolute session start: calendar date + start time interpreted in the
/// business timezone, converted to UTC.
pub fn session_start_utc(schedule: &Schedule, tz: Tz) -> Result<DateTime<Utc>> {
    let naive = schedule.date.and_time(schedule.start_time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        // DST fold: take the earlier wall-clock reading
        LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        LocalResult::None => Err(Error::validation(format!(
            "session start {naive} does not exist in timezone {tz}"
        ))),
    }
}

/// Compute and persist the pending notification rows for one schedule.
///
/// A reminder is only inserted while its send time is still ahead; a
/// reminder for a session that already started (or starts inside the
/// reminder window) is skipped rather than clamped to now. The
/// confirmation request gets the same future-only filter.
pub async fn schedule_notifications(
    store: &dyn ScheduleStore,
    schedule: &Schedule,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<usize> {
    let start = session_start_utc(schedule, tz)?;
    let mut rows = Vec::new();

    if schedule.reminder_minutes > 0 {
        let remind_at = start - Duration::minutes(i64::from(schedule.reminder_minutes));
        if remind_at > now {
            rows.push(ScheduleNotification::new(
                schedule.id,
                schedule.athlete_id,
                NotificationType::Reminder,
                remind_at,
            ));
        } else {
            tracing::debug!(
                schedule_id = %schedule.id,
                "notifications: reminder window already passed, skipped"
            );
        }
    }

    let confirm_at = start - Duration::hours(CONFIRMATION_LEAD_HOURS);
    if confirm_at > now {
        rows.push(ScheduleNotification::new(
            schedule.id,
            schedule.athlete_id,
            NotificationType::ConfirmationRequest,
            confirm_at,
        ));
    }

    if !rows.is_empty() {
        store.insert_notifications(&rows).await?;
    }
    Ok(rows.len())
}

/// Cancellation notice, due immediately. The reason travels in
/// `additional_data` so the email survives later edits to the schedule.
pub fn cancellation_notice(
    schedule: &Schedule,
    reason: &str,
    now: DateTime<Utc>,
) -> ScheduleNotification {
    ScheduleNotification::new(
        schedule.id,
        schedule.athlete_id,
        NotificationType::Cancellation,
        now,
    )
    .with_data(serde_json::json!({ "reason": reason }))
}

/// Reschedule notice, due immediately, carrying the superseded slot.
pub fn reschedule_notice(
    schedule: &Schedule,
    previous_date: NaiveDate,
    previous_start: NaiveTime,
    previous_end: NaiveTime,
    now: DateTime<Utc>,
) -> ScheduleNotification {
    ScheduleNotification::new(
        schedule.id,
        schedule.athlete_id,
        NotificationType::Reschedule,
        now,
    )
    .with_data(serde_json::json!({
        "previous_date": previous_date,
        "previous_start_time": previous_start,
        "previous_end_time": previous_end,
    }))
}

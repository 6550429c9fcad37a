use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::config::ConflictPolicy;
use crate::error::{Error, Result};
use crate::functions::conflicts::{check_conflicts, ConflictReport};
use crate::functions::{dispatcher, notifications};
use crate::schema::{
    RecurringPattern, Schedule, ScheduleChanges, ScheduleDraft, ScheduleNotification,
    ScheduleStatus,
};
use crate::services::EmailGateway;
use crate::store::{ScheduleStore, StoreError};

/// User-driven schedule operations. Every write runs the conflict gate
/// before touching the store; the dispatcher owns everything that happens
/// after a notification row exists.
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    mailer: Arc<dyn EmailGateway>,
    conflict_policy: ConflictPolicy,
    timezone: Tz,
}

fn session_duration(start: NaiveTime, end: NaiveTime) -> Result<i32> {
    let minutes = (end - start).num_minutes();
    if minutes <= 0 {
        return Err(Error::validation(
            "end time must be after start time on the same day",
        ));
    }
    Ok(minutes as i32)
}

fn validate_draft(draft: &ScheduleDraft) -> Result<()> {
    if draft.trainer_id.is_nil() {
        return Err(Error::validation("trainer is required"));
    }
    if draft.athlete_id.is_nil() {
        return Err(Error::validation("athlete is required"));
    }
    if draft.title.trim().is_empty() {
        return Err(Error::validation("title must not be empty"));
    }
    if draft.reminder_minutes < 0 {
        return Err(Error::validation("reminder minutes must not be negative"));
    }
    validate_meeting_link(draft.is_online, draft.meeting_link.as_deref())?;
    if let Some(pattern) = &draft.recurrence {
        pattern.validate().map_err(Error::Validation)?;
    }
    Ok(())
}

fn validate_meeting_link(is_online: bool, meeting_link: Option<&str>) -> Result<()> {
    let has_link = meeting_link.is_some_and(|l| !l.trim().is_empty());
    if is_online && !has_link {
        return Err(Error::validation(
            "online sessions require a meeting link",
        ));
    }
    if !is_online && has_link {
        return Err(Error::validation(
            "meeting link is only valid for online sessions",
        ));
    }
    Ok(())
}

fn schedule_from_draft(
    draft: &ScheduleDraft,
    date: NaiveDate,
    duration_minutes: i32,
    now: chrono::DateTime<Utc>,
) -> Schedule {
    Schedule {
        id: Uuid::new_v4(),
        trainer_id: draft.trainer_id,
        athlete_id: draft.athlete_id,
        title: draft.title.clone(),
        description: draft.description.clone(),
        date,
        start_time: draft.start_time,
        end_time: draft.end_time,
        duration_minutes,
        kind: draft.kind,
        status: ScheduleStatus::Scheduled,
        location: draft.location.clone(),
        is_online: draft.is_online,
        meeting_link: draft.meeting_link.clone(),
        reminder_minutes: draft.reminder_minutes,
        color: draft.color.clone(),
        notes: draft.notes.clone(),
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

impl ScheduleService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        mailer: Arc<dyn EmailGateway>,
        conflict_policy: ConflictPolicy,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            mailer,
            conflict_policy,
            timezone,
        }
    }

    /// Create one schedule, or a whole recurring series when the draft
    /// carries a pattern. Returns every row written.
    pub async fn create(&self, draft: ScheduleDraft) -> Result<Vec<Schedule>> {
        validate_draft(&draft)?;
        let duration = session_duration(draft.start_time, draft.end_time)?;
        let now = Utc::now();

        let rows = match &draft.recurrence {
            None => {
                self.conflict_gate(
                    draft.trainer_id,
                    draft.date,
                    draft.start_time,
                    draft.end_time,
                    None,
                )
                .await?;
                let schedule = schedule_from_draft(&draft, draft.date, duration, now);
                self.store.insert_schedule(&schedule).await?;
                vec![schedule]
            }
            Some(pattern) => {
                self.create_series(&draft, pattern, duration, now).await?
            }
        };

        for schedule in &rows {
            if let Err(err) = notifications::schedule_notifications(
                self.store.as_ref(),
                schedule,
                self.timezone,
                now,
            )
            .await
            {
                tracing::warn!(
                    schedule_id = %schedule.id,
                    error = %err,
                    "scheduling: failed to queue notifications"
                );
            }
        }

        tracing::info!(
            trainer_id = %draft.trainer_id,
            count = rows.len(),
            "scheduling: created"
        );
        Ok(rows)
    }

    /// Expand, conflict-check every occurrence, then insert the batch.
    /// All or nothing: one conflicting occurrence rejects the whole
    /// series before any row is written.
    async fn create_series(
        &self,
        draft: &ScheduleDraft,
        pattern: &RecurringPattern,
        duration: i32,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<Schedule>> {
        let dates = pattern.expand_from(draft.date);
        if dates.is_empty() {
            return Err(Error::validation(
                "recurrence pattern produces no occurrences",
            ));
        }

        let mut conflicts = Vec::new();
        for date in &dates {
            match check_conflicts(
                self.store.as_ref(),
                draft.trainer_id,
                *date,
                draft.start_time,
                draft.end_time,
                None,
            )
            .await
            {
                Ok(report) => conflicts.extend(report.conflicts),
                Err(err) => self.conflict_check_failed(err)?,
            }
        }
        if !conflicts.is_empty() {
            return Err(Error::Conflict { conflicts });
        }

        let mut rows = Vec::with_capacity(dates.len());
        let mut parent = schedule_from_draft(draft, dates[0], duration, now);
        parent.recurrence = Some(pattern.clone());
        let parent_id = parent.id;
        rows.push(parent);

        for (idx, date) in dates.iter().enumerate().skip(1) {
            let mut occurrence = schedule_from_draft(draft, *date, duration, now);
            occurrence.parent_schedule_id = Some(parent_id);
            occurrence.occurrence_number = Some(idx as i32 + 1);
            rows.push(occurrence);
        }

        self.store.insert_schedules(&rows).await?;
        Ok(rows)
    }

    /// Partial update. Moving the session re-runs the conflict gate
    /// (excluding the row itself), recomputes the duration, and queues a
    /// reschedule notice carrying the superseded slot.
    pub async fn update(&self, id: Uuid, changes: ScheduleChanges) -> Result<Schedule> {
        let mut schedule = self.fetch(id).await?;
        if schedule.is_cancelled() {
            return Err(Error::validation("cannot update a cancelled schedule"));
        }
        if changes.status == Some(ScheduleStatus::Cancelled) {
            return Err(Error::validation(
                "use the cancel operation to cancel a schedule",
            ));
        }

        let previous = (schedule.date, schedule.start_time, schedule.end_time);

        if let Some(title) = changes.title {
            if title.trim().is_empty() {
                return Err(Error::validation("title must not be empty"));
            }
            schedule.title = title;
        }
        if let Some(v) = changes.description {
            schedule.description = Some(v);
        }
        if let Some(v) = changes.date {
            schedule.date = v;
        }
        if let Some(v) = changes.start_time {
            schedule.start_time = v;
        }
        if let Some(v) = changes.end_time {
            schedule.end_time = v;
        }
        if let Some(v) = changes.kind {
            schedule.kind = v;
        }
        if let Some(v) = changes.status {
            schedule.status = v;
        }
        if let Some(v) = changes.location {
            schedule.location = Some(v);
        }
        if let Some(v) = changes.is_online {
            schedule.is_online = v;
        }
        if let Some(v) = changes.meeting_link {
            schedule.meeting_link = Some(v);
        }
        if let Some(v) = changes.reminder_minutes {
            if v < 0 {
                return Err(Error::validation("reminder minutes must not be negative"));
            }
            schedule.reminder_minutes = v;
        }
        if let Some(v) = changes.color {
            schedule.color = Some(v);
        }
        if let Some(v) = changes.notes {
            schedule.notes = Some(v);
        }
        if let Some(v) = changes.athlete_confirmed {
            schedule.athlete_confirmed = v;
        }

        validate_meeting_link(schedule.is_online, schedule.meeting_link.as_deref())?;

        let moved = (schedule.date, schedule.start_time, schedule.end_time) != previous;
        if moved {
            schedule.duration_minutes =
                session_duration(schedule.start_time, schedule.end_time)?;
            self.conflict_gate(
                schedule.trainer_id,
                schedule.date,
                schedule.start_time,
                schedule.end_time,
                Some(schedule.id),
            )
            .await?;
        }

        let now = Utc::now();
        schedule.updated_at = now;
        self.store.update_schedule(&schedule).await?;

        if moved {
            let notice =
                notifications::reschedule_notice(&schedule, previous.0, previous.1, previous.2, now);
            if let Err(err) = self.store.insert_notifications(&[notice]).await {
                tracing::warn!(
                    schedule_id = %schedule.id,
                    error = %err,
                    "scheduling: failed to queue reschedule notice"
                );
            }
        }

        Ok(schedule)
    }

    /// Cancel is terminal: the row stays, its pending notifications flip
    /// to cancelled, and the athlete is told right away.
    pub async fn cancel(
        &self,
        id: Uuid,
        reason: String,
        cancelled_by: String,
    ) -> Result<Schedule> {
        let mut schedule = self.fetch(id).await?;
        if schedule.is_cancelled() {
            return Err(Error::validation("schedule is already cancelled"));
        }

        let now = Utc::now();
        schedule.status = ScheduleStatus::Cancelled;
        schedule.cancelled_reason = Some(reason.clone());
        schedule.cancelled_by = Some(cancelled_by);
        schedule.cancelled_at = Some(now);
        schedule.updated_at = now;
        self.store.update_schedule(&schedule).await?;

        let cleared = self.store.cancel_pending_notifications(id, now).await?;
        if cleared > 0 {
            tracing::info!(schedule_id = %id, cleared, "scheduling: pending notifications cancelled");
        }

        let notice = notifications::cancellation_notice(&schedule, &reason, now);
        self.store
            .insert_notifications(std::slice::from_ref(&notice))
            .await?;

        // cancellation should be visibly immediate; if this push fails the
        // row is still pending and the polling dispatcher retries it
        match dispatcher::process_notification(
            self.store.as_ref(),
            self.mailer.as_ref(),
            notice,
            now,
        )
        .await
        {
            Ok(outcome) => {
                tracing::debug!(schedule_id = %id, ?outcome, "scheduling: cancellation notice dispatched")
            }
            Err(err) => {
                tracing::warn!(schedule_id = %id, error = %err, "scheduling: immediate cancellation dispatch failed")
            }
        }

        Ok(schedule)
    }

    /// Hard removal. Pending notifications are cancelled; already-sent
    /// rows stay behind as history.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.fetch(id).await?;
        let now = Utc::now();
        let cleared = self.store.cancel_pending_notifications(id, now).await?;
        if cleared > 0 {
            tracing::info!(schedule_id = %id, cleared, "scheduling: pending notifications cancelled");
        }
        self.store.delete_schedule(id).await?;
        tracing::info!(schedule_id = %id, "scheduling: deleted");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Schedule> {
        self.fetch(id).await
    }

    pub async fn day_listing(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Schedule>> {
        Ok(self.store.schedules_for_trainer_on(trainer_id, date).await?)
    }

    pub async fn notifications(&self, id: Uuid) -> Result<Vec<ScheduleNotification>> {
        self.fetch(id).await?;
        Ok(self.store.notifications_for_schedule(id).await?)
    }

    /// Explicit (re)computation of a schedule's notification rows;
    /// returns how many were inserted.
    pub async fn create_notifications(&self, id: Uuid) -> Result<usize> {
        let schedule = self.fetch(id).await?;
        notifications::schedule_notifications(
            self.store.as_ref(),
            &schedule,
            self.timezone,
            Utc::now(),
        )
        .await
    }

    /// Standalone conflict probe used by the UI while a form is being
    /// filled in. Storage failures surface as-is here; the policy only
    /// applies to writes.
    pub async fn probe_conflicts(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<ConflictReport> {
        if start_time >= end_time {
            return Err(Error::validation("end time must be after start time"));
        }
        Ok(check_conflicts(
            self.store.as_ref(),
            trainer_id,
            date,
            start_time,
            end_time,
            exclude,
        )
        .await?)
    }

    pub fn preview_recurrence(
        &self,
        start: NaiveDate,
        pattern: &RecurringPattern,
    ) -> Result<Vec<NaiveDate>> {
        pattern.validate().map_err(Error::Validation)?;
        Ok(pattern.expand_from(start))
    }

    async fn fetch(&self, id: Uuid) -> Result<Schedule> {
        self.store
            .get_schedule(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))
    }

    async fn conflict_gate(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        match check_conflicts(
            self.store.as_ref(),
            trainer_id,
            date,
            start_time,
            end_time,
            exclude,
        )
        .await
        {
            Ok(report) if report.has_conflict => Err(Error::Conflict {
                conflicts: report.conflicts,
            }),
            Ok(_) => Ok(()),
            Err(err) => self.conflict_check_failed(err),
        }
    }

    fn conflict_check_failed(&self, err: StoreError) -> Result<()> {
        match self.conflict_policy {
            ConflictPolicy::FailOpen => {
                tracing::warn!(
                    error = %err,
                    "scheduling: conflict check failed, proceeding fail-open"
                );
                Ok(())
            }
            ConflictPolicy::FailClosed => Err(Error::ConflictCheckUnavailable(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Frequency, NotificationStatus, NotificationType};
    use crate::store::MemoryStore;
    use crate::testutil::{date, draft, recipient, schedule_at, time, RecordingMailer};
    use chrono::Duration;

    fn setup() -> (Arc<MemoryStore>, Arc<RecordingMailer>, ScheduleService) {
        setup_with_policy(ConflictPolicy::FailOpen)
    }

    fn setup_with_policy(
        policy: ConflictPolicy,
    ) -> (Arc<MemoryStore>, Arc<RecordingMailer>, ScheduleService) {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let service = ScheduleService::new(store.clone(), mailer.clone(), policy, chrono_tz::UTC);
        (store, mailer, service)
    }

    #[tokio::test]
    async fn create_computes_duration() {
        let (_, _, service) = setup();
        let rows = service
            .create(draft(
                Uuid::new_v4(),
                date(2025, 2, 10),
                time(9, 0),
                time(10, 0),
            ))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_minutes, 60);
        assert_eq!(rows[0].status, ScheduleStatus::Scheduled);
    }

    #[tokio::test]
    async fn create_rejects_inverted_times() {
        let (store, _, service) = setup();
        let err = service
            .create(draft(
                Uuid::new_v4(),
                date(2025, 2, 10),
                time(22, 0),
                time(6, 0),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.schedule_count(), 0);
    }

    #[tokio::test]
    async fn create_requires_meeting_link_for_online() {
        let (_, _, service) = setup();
        let mut d = draft(Uuid::new_v4(), date(2025, 2, 10), time(9, 0), time(10, 0));
        d.is_online = true;
        let err = service.create(d).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn overlapping_create_is_blocked_and_writes_nothing() {
        let (store, _, service) = setup();
        let trainer = Uuid::new_v4();
        let existing = schedule_at(trainer, date(2025, 2, 10), time(14, 30), time(15, 30));
        store.insert_schedule(&existing).await.unwrap();

        let mut d = draft(trainer, date(2025, 2, 10), time(14, 0), time(15, 0));
        d.reminder_minutes = 30;
        let err = service.create(d).await.unwrap_err();

        match err {
            Error::Conflict { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, existing.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.schedule_count(), 1);
        assert_eq!(store.notification_count(), 0);
    }

    #[tokio::test]
    async fn back_to_back_sessions_are_allowed() {
        let (store, _, service) = setup();
        let trainer = Uuid::new_v4();
        store
            .insert_schedule(&schedule_at(
                trainer,
                date(2025, 2, 10),
                time(9, 0),
                time(10, 0),
            ))
            .await
            .unwrap();

        service
            .create(draft(trainer, date(2025, 2, 10), time(10, 0), time(11, 0)))
            .await
            .unwrap();
        assert_eq!(store.schedule_count(), 2);
    }

    #[tokio::test]
    async fn recurring_create_links_occurrences_to_parent() {
        let (store, _, service) = setup();
        let mut d = draft(Uuid::new_v4(), date(2025, 3, 3), time(9, 0), time(10, 0));
        d.recurrence = Some(RecurringPattern {
            frequency: Frequency::Daily { interval: 1 },
            end_date: None,
            occurrences: Some(3),
        });

        let rows = service.create(d).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(store.schedule_count(), 3);

        let parent = &rows[0];
        assert!(parent.is_recurring());
        assert_eq!(parent.parent_schedule_id, None);
        assert_eq!(rows[1].parent_schedule_id, Some(parent.id));
        assert_eq!(rows[1].occurrence_number, Some(2));
        assert_eq!(rows[2].occurrence_number, Some(3));
        assert_eq!(rows[2].date, date(2025, 3, 5));
    }

    #[tokio::test]
    async fn recurring_create_is_all_or_nothing() {
        let (store, _, service) = setup();
        let trainer = Uuid::new_v4();
        // blocks the third occurrence only
        store
            .insert_schedule(&schedule_at(
                trainer,
                date(2025, 3, 5),
                time(9, 30),
                time(10, 30),
            ))
            .await
            .unwrap();

        let mut d = draft(trainer, date(2025, 3, 3), time(9, 0), time(10, 0));
        d.recurrence = Some(RecurringPattern {
            frequency: Frequency::Daily { interval: 1 },
            end_date: None,
            occurrences: Some(5),
        });

        let err = service.create(d).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(store.schedule_count(), 1);
    }

    #[tokio::test]
    async fn update_excludes_self_from_conflict_check() {
        let (_, _, service) = setup();
        let rows = service
            .create(draft(
                Uuid::new_v4(),
                date(2025, 2, 10),
                time(9, 0),
                time(10, 0),
            ))
            .await
            .unwrap();

        // shifting within its own slot must not conflict with itself
        let updated = service
            .update(
                rows[0].id,
                ScheduleChanges {
                    start_time: Some(time(9, 15)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.duration_minutes, 45);
    }

    #[tokio::test]
    async fn update_onto_busy_slot_conflicts() {
        let (store, _, service) = setup();
        let trainer = Uuid::new_v4();
        let busy = schedule_at(trainer, date(2025, 2, 10), time(11, 0), time(12, 0));
        store.insert_schedule(&busy).await.unwrap();

        let mut d = draft(trainer, date(2025, 2, 10), time(9, 0), time(10, 0));
        d.athlete_id = Uuid::new_v4();
        let rows = service.create(d).await.unwrap();

        let err = service
            .update(
                rows[0].id,
                ScheduleChanges {
                    start_time: Some(time(11, 30)),
                    end_time: Some(time(12, 30)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn moving_a_session_queues_a_reschedule_notice() {
        let (store, _, service) = setup();
        let rows = service
            .create(draft(
                Uuid::new_v4(),
                date(2025, 2, 10),
                time(9, 0),
                time(10, 0),
            ))
            .await
            .unwrap();

        service
            .update(
                rows[0].id,
                ScheduleChanges {
                    date: Some(date(2025, 2, 11)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let notices = store
            .notifications_for_schedule(rows[0].id)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.kind == NotificationType::Reschedule)
            .collect::<Vec<_>>();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].additional_data["previous_date"], "2025-02-10");
    }

    #[tokio::test]
    async fn cancel_cascades_to_pending_notifications() {
        let (store, mailer, service) = setup();
        let future = Utc::now() + Duration::days(7);
        let mut d = draft(Uuid::new_v4(), future.date_naive(), time(14, 0), time(15, 0));
        d.reminder_minutes = 30;
        store.insert_recipient(recipient(d.athlete_id));

        let rows = service.create(d).await.unwrap();
        let id = rows[0].id;
        // reminder + confirmation request
        assert_eq!(store.notification_count(), 2);

        let cancelled = service
            .cancel(id, "trainer unavailable".to_string(), "trainer".to_string())
            .await
            .unwrap();
        assert!(cancelled.is_cancelled());
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(
            cancelled.cancelled_reason.as_deref(),
            Some("trainer unavailable")
        );

        let rows = store.notifications_for_schedule(id).await.unwrap();
        let pending_left = rows
            .iter()
            .filter(|n| {
                n.kind != NotificationType::Cancellation
                    && n.status != NotificationStatus::Cancelled
            })
            .count();
        assert_eq!(pending_left, 0);

        // the cancellation notice went out synchronously
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.to_lowercase().contains("cancelled"));
    }

    #[tokio::test]
    async fn cancel_twice_is_rejected() {
        let (store, _, service) = setup();
        let d = draft(Uuid::new_v4(), date(2025, 2, 10), time(9, 0), time(10, 0));
        store.insert_recipient(recipient(d.athlete_id));
        let rows = service.create(d).await.unwrap();

        service
            .cancel(rows[0].id, "sick".to_string(), "athlete".to_string())
            .await
            .unwrap();
        let err = service
            .cancel(rows[0].id, "again".to_string(), "athlete".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn delete_keeps_sent_notifications_as_history() {
        let (store, _, service) = setup();
        let future = Utc::now() + Duration::days(7);
        let mut d = draft(Uuid::new_v4(), future.date_naive(), time(14, 0), time(15, 0));
        d.reminder_minutes = 30;
        let rows = service.create(d).await.unwrap();
        let id = rows[0].id;

        service.delete(id).await.unwrap();
        assert_eq!(store.schedule_count(), 0);

        // rows survive, flipped to cancelled rather than removed
        let rows = store.notifications_for_schedule(id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|n| n.status == NotificationStatus::Cancelled));

        let err = service.delete(id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn storage_outage_respects_conflict_policy() {
        let (store, _, service) = setup_with_policy(ConflictPolicy::FailClosed);
        store.set_healthy(false);
        let err = service
            .create(draft(
                Uuid::new_v4(),
                date(2025, 2, 10),
                time(9, 0),
                time(10, 0),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConflictCheckUnavailable(_)));

        // fail-open lets the write proceed past the broken check; it then
        // fails on the insert itself, proving the gate stepped aside
        let (store, _, service) = setup_with_policy(ConflictPolicy::FailOpen);
        store.set_healthy(false);
        let err = service
            .create(draft(
                Uuid::new_v4(),
                date(2025, 2, 10),
                time(9, 0),
                time(10, 0),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}

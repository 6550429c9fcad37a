use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::schema::{
    NotificationStatus, NotificationType, Recipient, Schedule, ScheduleNotification,
};
use crate::services::{EmailGateway, OutboundEmail};
use crate::store::{ScheduleStore, StoreResult};

/// A notification is retried until this many attempts, then parked as
/// terminally failed.
pub const MAX_SEND_ATTEMPTS: i32 = 3;

const BACKOFF_BASE_MINUTES: i64 = 5;

/// Exponential backoff after a failed send: 5 x 2^attempts minutes
/// (10 min after the first failure, 20 after the second).
pub fn retry_delay(attempt_count: i32) -> Duration {
    Duration::minutes(BACKOFF_BASE_MINUTES * 2i64.pow(attempt_count.clamp(0, 30) as u32))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Retried,
    Failed,
    Cancelled,
}

fn format_slot(schedule: &Schedule) -> String {
    format!(
        "{} from {} to {}",
        schedule.date.format("%A %-d %B %Y"),
        schedule.start_time.format("%H:%M"),
        schedule.end_time.format("%H:%M")
    )
}

fn venue_line(schedule: &Schedule) -> String {
    if schedule.is_online {
        match &schedule.meeting_link {
            Some(link) => format!("\nJoin online: {link}"),
            None => String::new(),
        }
    } else {
        match &schedule.location {
            Some(location) => format!("\nLocation: {location}"),
            None => String::new(),
        }
    }
}

fn build_email(
    notification: &ScheduleNotification,
    schedule: &Schedule,
    recipient: &Recipient,
) -> OutboundEmail {
    let slot = format_slot(schedule);
    let venue = venue_line(schedule);

    let (subject, body) = match notification.kind {
        NotificationType::Reminder => (
            format!(
                "Reminder: {} on {}",
                schedule.title,
                schedule.date.format("%-d %B")
            ),
            format!(
                "Hi {},\n\nA quick reminder of your upcoming session \"{}\" on {slot}.{venue}\n\nSee you there!",
                recipient.name, schedule.title
            ),
        ),
        NotificationType::ConfirmationRequest => (
            format!("Please confirm your session: {}", schedule.title),
            format!(
                "Hi {},\n\nYour session \"{}\" is coming up on {slot}.{venue}\n\nPlease confirm you will attend.",
                recipient.name, schedule.title
            ),
        ),
        NotificationType::Cancellation => {
            let reason = notification
                .additional_data
                .get("reason")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no reason given");
            (
                format!("Session cancelled: {}", schedule.title),
                format!(
                    "Hi {},\n\nYour session \"{}\" on {slot} has been cancelled.\nReason: {reason}",
                    recipient.name, schedule.title
                ),
            )
        }
        NotificationType::Reschedule => {
            let previous = notification
                .additional_data
                .get("previous_date")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("its previous slot");
            (
                format!("Session rescheduled: {}", schedule.title),
                format!(
                    "Hi {},\n\nYour session \"{}\" has moved from {previous} to {slot}.{venue}",
                    recipient.name, schedule.title
                ),
            )
        }
    };

    let html = format!(
        "<p>{}</p>",
        body.replace("\n\n", "</p><p>").replace('\n', "<br>")
    );

    OutboundEmail {
        to: recipient.email.clone(),
        subject,
        html,
        text: Some(body),
        tags: vec![
            ("kind".to_string(), notification.kind.as_str().to_string()),
            ("schedule_id".to_string(), schedule.id.to_string()),
        ],
    }
}

/// Whether the notification should still go out given the owning
/// schedule's current state. Cancellation and reschedule notices are
/// exactly about schedules that changed, so a cancelled status does not
/// block them.
fn sendable(notification: &ScheduleNotification, schedule: &Schedule) -> bool {
    matches!(
        notification.kind,
        NotificationType::Cancellation | NotificationType::Reschedule
    ) || !schedule.is_cancelled()
}

/// Process one due notification end to end: re-read the owning schedule,
/// build the email, send, and record the outcome on the row. Send
/// failures never propagate; only storage errors do.
pub async fn process_notification(
    store: &dyn ScheduleStore,
    mailer: &dyn EmailGateway,
    mut notification: ScheduleNotification,
    now: DateTime<Utc>,
) -> StoreResult<DispatchOutcome> {
    let schedule = match store.get_schedule(notification.schedule_id).await? {
        Some(s) => s,
        None => {
            notification.status = NotificationStatus::Cancelled;
            notification.updated_at = now;
            store.update_notification(&notification).await?;
            tracing::info!(
                notification_id = %notification.id,
                "dispatcher: schedule gone, notification cancelled"
            );
            return Ok(DispatchOutcome::Cancelled);
        }
    };

    if !sendable(&notification, &schedule) {
        notification.status = NotificationStatus::Cancelled;
        notification.updated_at = now;
        store.update_notification(&notification).await?;
        tracing::info!(
            notification_id = %notification.id,
            schedule_id = %schedule.id,
            "dispatcher: schedule no longer active, notification cancelled"
        );
        return Ok(DispatchOutcome::Cancelled);
    }

    let recipient = match store.get_recipient(notification.recipient_id).await? {
        Some(r) => r,
        None => {
            notification.status = NotificationStatus::Failed;
            notification.last_error =
                Some(format!("recipient {} not found", notification.recipient_id));
            notification.updated_at = now;
            store.update_notification(&notification).await?;
            tracing::error!(
                notification_id = %notification.id,
                recipient_id = %notification.recipient_id,
                "dispatcher: recipient missing, notification failed"
            );
            return Ok(DispatchOutcome::Failed);
        }
    };

    let email = build_email(&notification, &schedule, &recipient);

    match mailer.send(email).await {
        Ok(()) => {
            notification.status = NotificationStatus::Sent;
            notification.sent_at = Some(now);
            notification.updated_at = now;
            store.update_notification(&notification).await?;
            tracing::info!(
                notification_id = %notification.id,
                schedule_id = %schedule.id,
                kind = notification.kind.as_str(),
                attempt = notification.attempt_count + 1,
                "dispatcher: notification sent"
            );
            Ok(DispatchOutcome::Sent)
        }
        Err(err) => {
            notification.attempt_count += 1;
            notification.last_error = Some(err.to_string());
            notification.updated_at = now;

            if notification.attempt_count < MAX_SEND_ATTEMPTS {
                let delay = retry_delay(notification.attempt_count);
                notification.scheduled_for = now + delay;
                store.update_notification(&notification).await?;
                tracing::warn!(
                    notification_id = %notification.id,
                    attempt = notification.attempt_count,
                    retry_in_minutes = delay.num_minutes(),
                    error = %err,
                    "dispatcher: send failed, retry scheduled"
                );
                Ok(DispatchOutcome::Retried)
            } else {
                notification.status = NotificationStatus::Failed;
                store.update_notification(&notification).await?;
                tracing::error!(
                    notification_id = %notification.id,
                    attempts = notification.attempt_count,
                    error = %err,
                    "dispatcher: send failed permanently"
                );
                Ok(DispatchOutcome::Failed)
            }
        }
    }
}

/// One polling pass: fetch the due batch and work through it one row at
/// a time. Returns how many rows were processed.
pub async fn dispatch_tick(
    store: &dyn ScheduleStore,
    mailer: &dyn EmailGateway,
    batch_size: i64,
) -> anyhow::Result<u32> {
    let due = store.due_notifications(Utc::now(), batch_size).await?;
    if due.is_empty() {
        return Ok(0);
    }

    tracing::debug!(count = due.len(), "dispatcher: processing due notifications");

    let mut processed = 0u32;
    for notification in due {
        process_notification(store, mailer, notification, Utc::now()).await?;
        processed += 1;
    }
    Ok(processed)
}

/// The polling worker. One instance per process, created in `main` and
/// handed to whoever needs to start/stop it; owns its timer task and
/// shutdown channel instead of hiding them in module state.
pub struct NotificationWorker {
    store: Arc<dyn ScheduleStore>,
    mailer: Arc<dyn EmailGateway>,
    interval: StdDuration,
    batch_size: i64,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl NotificationWorker {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        mailer: Arc<dyn EmailGateway>,
        interval: StdDuration,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            mailer,
            interval,
            batch_size,
            handle: None,
            shutdown: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the polling loop. Starting a running worker is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("dispatcher: worker already running, start ignored");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let store = self.store.clone();
        let mailer = self.mailer.clone();
        let interval = self.interval;
        let batch_size = self.batch_size;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        match dispatch_tick(store.as_ref(), mailer.as_ref(), batch_size).await {
                            Ok(n) if n > 0 => tracing::info!(processed = n, "dispatcher tick"),
                            Err(e) => tracing::error!(error = %e, "dispatcher tick failed"),
                            _ => {}
                        }
                    }
                }
            }
        });

        self.handle = Some(handle);
        self.shutdown = Some(tx);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "dispatcher: worker started"
        );
    }

    /// Signal the loop and wait for it; a tick in flight finishes its
    /// current notification. Stopping a stopped worker is a no-op.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        let _ = handle.await;
        tracing::info!("dispatcher: worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScheduleStatus;
    use crate::store::MemoryStore;
    use crate::testutil::{recipient, schedule_at, time, FlakyMailer, RecordingMailer};
    use uuid::Uuid;

    async fn seed_due(store: &MemoryStore) -> (Schedule, ScheduleNotification) {
        let schedule = schedule_at(
            Uuid::new_v4(),
            (Utc::now() + Duration::days(2)).date_naive(),
            time(14, 0),
            time(15, 0),
        );
        store.insert_schedule(&schedule).await.unwrap();
        store.insert_recipient(recipient(schedule.athlete_id));

        let notification = ScheduleNotification::new(
            schedule.id,
            schedule.athlete_id,
            NotificationType::Reminder,
            Utc::now() - Duration::minutes(1),
        );
        store.insert_notifications(&[notification.clone()]).await.unwrap();
        (schedule, notification)
    }

    async fn only_notification(
        store: &MemoryStore,
        schedule_id: Uuid,
    ) -> ScheduleNotification {
        let rows = store.notifications_for_schedule(schedule_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        rows.into_iter().next().unwrap()
    }

    async fn force_due(store: &MemoryStore, schedule_id: Uuid) {
        let mut row = only_notification(store, schedule_id).await;
        row.scheduled_for = Utc::now() - Duration::minutes(1);
        store.update_notification(&row).await.unwrap();
    }

    #[tokio::test]
    async fn successful_send_marks_row_sent() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let (schedule, _) = seed_due(&store).await;

        let processed = dispatch_tick(&store, &mailer, 10).await.unwrap();
        assert_eq!(processed, 1);

        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Sent);
        assert!(row.sent_at.is_some());
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_backs_off_exponentially() {
        let store = MemoryStore::new();
        let mailer = FlakyMailer::failing(2);
        let (schedule, _) = seed_due(&store).await;

        // first failure: retry in ~10 minutes
        let before = Utc::now();
        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Pending);
        assert_eq!(row.attempt_count, 1);
        assert!(row.last_error.is_some());
        let delay = row.scheduled_for - before;
        assert!(delay >= Duration::minutes(9) && delay <= Duration::minutes(11));

        // not due anymore: the tick skips it
        assert_eq!(dispatch_tick(&store, &mailer, 10).await.unwrap(), 0);

        // second failure: retry in ~20 minutes
        force_due(&store, schedule.id).await;
        let before = Utc::now();
        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.attempt_count, 2);
        let delay = row.scheduled_for - before;
        assert!(delay >= Duration::minutes(19) && delay <= Duration::minutes(21));

        // third attempt succeeds
        force_due(&store, schedule.id).await;
        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Sent);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn three_failures_park_the_row_for_good() {
        let store = MemoryStore::new();
        let mailer = FlakyMailer::failing(10);
        let (schedule, _) = seed_due(&store).await;

        for _ in 0..3 {
            force_due(&store, schedule.id).await;
            dispatch_tick(&store, &mailer, 10).await.unwrap();
        }

        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.attempt_count, 3);
        assert!(row.last_error.is_some());

        // terminal: even once due again, the tick never picks it up
        let mut row = row;
        row.scheduled_for = Utc::now() - Duration::minutes(1);
        store.update_notification(&row).await.unwrap();
        assert_eq!(dispatch_tick(&store, &mailer, 10).await.unwrap(), 0);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_schedule_suppresses_reminder() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let (mut schedule, _) = seed_due(&store).await;

        schedule.status = ScheduleStatus::Cancelled;
        store.update_schedule(&schedule).await.unwrap();

        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Cancelled);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_notice_sends_for_cancelled_schedule() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let mut schedule = schedule_at(
            Uuid::new_v4(),
            (Utc::now() + Duration::days(2)).date_naive(),
            time(14, 0),
            time(15, 0),
        );
        schedule.status = ScheduleStatus::Cancelled;
        store.insert_schedule(&schedule).await.unwrap();
        store.insert_recipient(recipient(schedule.athlete_id));

        let notice = ScheduleNotification::new(
            schedule.id,
            schedule.athlete_id,
            NotificationType::Cancellation,
            Utc::now() - Duration::minutes(1),
        )
        .with_data(serde_json::json!({ "reason": "trainer unavailable" }));
        store.insert_notifications(&[notice]).await.unwrap();

        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Sent);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.as_ref().unwrap().contains("trainer unavailable"));
    }

    #[tokio::test]
    async fn missing_schedule_cancels_the_row() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let (schedule, _) = seed_due(&store).await;
        store.delete_schedule(schedule.id).await.unwrap();

        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Cancelled);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_recipient_fails_terminally() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let schedule = schedule_at(
            Uuid::new_v4(),
            (Utc::now() + Duration::days(2)).date_naive(),
            time(14, 0),
            time(15, 0),
        );
        store.insert_schedule(&schedule).await.unwrap();
        // no recipient row on purpose
        let notification = ScheduleNotification::new(
            schedule.id,
            schedule.athlete_id,
            NotificationType::Reminder,
            Utc::now() - Duration::minutes(1),
        );
        store.insert_notifications(&[notification]).await.unwrap();

        dispatch_tick(&store, &mailer, 10).await.unwrap();
        let row = only_notification(&store, schedule.id).await;
        assert_eq!(row.status, NotificationStatus::Failed);
        assert!(row.last_error.as_ref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn tick_respects_the_batch_limit() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let schedule = schedule_at(
            Uuid::new_v4(),
            (Utc::now() + Duration::days(2)).date_naive(),
            time(14, 0),
            time(15, 0),
        );
        store.insert_schedule(&schedule).await.unwrap();
        store.insert_recipient(recipient(schedule.athlete_id));

        let rows: Vec<ScheduleNotification> = (0..15)
            .map(|i| {
                ScheduleNotification::new(
                    schedule.id,
                    schedule.athlete_id,
                    NotificationType::Reminder,
                    Utc::now() - Duration::minutes(i + 1),
                )
            })
            .collect();
        store.insert_notifications(&rows).await.unwrap();

        assert_eq!(dispatch_tick(&store, &mailer, 10).await.unwrap(), 10);
        assert_eq!(dispatch_tick(&store, &mailer, 10).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn worker_start_and_stop_are_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        seed_due(&store).await;

        let mut worker = NotificationWorker::new(
            store.clone(),
            mailer.clone(),
            StdDuration::from_millis(10),
            10,
        );
        assert!(!worker.is_running());

        worker.start();
        worker.start(); // warns and does nothing
        assert!(worker.is_running());

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        worker.stop().await;
        assert!(!worker.is_running());
        worker.stop().await; // no-op

        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(retry_delay(1), Duration::minutes(10));
        assert_eq!(retry_delay(2), Duration::minutes(20));
        assert_eq!(retry_delay(3), Duration::minutes(40));
    }
}

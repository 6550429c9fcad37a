//! In-memory store for unit tests and local development. All tables live
//! in HashMaps behind one RwLock; `set_healthy(false)` makes every call
//! fail with a connection error to exercise storage-outage paths.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::schema::{NotificationStatus, Recipient, Schedule, ScheduleNotification};
use crate::store::{ScheduleStore, StoreError, StoreResult};

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    schedules: HashMap<Uuid, Schedule>,
    notifications: HashMap<Uuid, ScheduleNotification>,
    recipients: HashMap<Uuid, Recipient>,
    unhealthy: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a storage outage for every subsequent call.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().unwrap().unhealthy = !healthy;
    }

    pub fn insert_recipient(&self, recipient: Recipient) {
        self.data
            .write()
            .unwrap()
            .recipients
            .insert(recipient.id, recipient);
    }

    pub fn schedule_count(&self) -> usize {
        self.data.read().unwrap().schedules.len()
    }

    pub fn notification_count(&self) -> usize {
        self.data.read().unwrap().notifications.len()
    }

    fn check(tables: &Tables) -> StoreResult<()> {
        if tables.unhealthy {
            Err(StoreError::Connection("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<bool> {
        Ok(!self.data.read().unwrap().unhealthy)
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        data.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn insert_schedules(&self, schedules: &[Schedule]) -> StoreResult<()> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        for schedule in schedules {
            data.schedules.insert(schedule.id, schedule.clone());
        }
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let data = self.data.read().unwrap();
        Self::check(&data)?;
        Ok(data.schedules.get(&id).cloned())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        data.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        Ok(data.schedules.remove(&id).is_some())
    }

    async fn schedules_for_trainer_on(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Schedule>> {
        let data = self.data.read().unwrap();
        Self::check(&data)?;
        let mut rows: Vec<Schedule> = data
            .schedules
            .values()
            .filter(|s| s.trainer_id == trainer_id && s.date == date)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.start_time);
        Ok(rows)
    }

    async fn insert_notifications(&self, rows: &[ScheduleNotification]) -> StoreResult<()> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        for row in rows {
            data.notifications.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn update_notification(&self, row: &ScheduleNotification) -> StoreResult<()> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        data.notifications.insert(row.id, row.clone());
        Ok(())
    }

    async fn due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduleNotification>> {
        let data = self.data.read().unwrap();
        Self::check(&data)?;
        let mut due: Vec<ScheduleNotification> = data
            .notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Pending && n.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_for);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn notifications_for_schedule(
        &self,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<ScheduleNotification>> {
        let data = self.data.read().unwrap();
        Self::check(&data)?;
        let mut rows: Vec<ScheduleNotification> = data
            .notifications
            .values()
            .filter(|n| n.schedule_id == schedule_id)
            .cloned()
            .collect();
        rows.sort_by_key(|n| n.scheduled_for);
        Ok(rows)
    }

    async fn cancel_pending_notifications(
        &self,
        schedule_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut data = self.data.write().unwrap();
        Self::check(&data)?;
        let mut flipped = 0u64;
        for row in data.notifications.values_mut() {
            if row.schedule_id == schedule_id && row.status == NotificationStatus::Pending {
                row.status = NotificationStatus::Cancelled;
                row.updated_at = now;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn get_recipient(&self, id: Uuid) -> StoreResult<Option<Recipient>> {
        let data = self.data.read().unwrap();
        Self::check(&data)?;
        Ok(data.recipients.get(&id).cloned())
    }
}

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::schema::Schedule;
use crate::store::{ScheduleStore, StoreResult};

#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflicts: Vec<Schedule>,
}

/// Half-open interval intersection: [a_start, a_end) against
/// [b_start, b_end). Back-to-back sessions (one ends exactly when the
/// next starts) do not overlap.
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Find every non-cancelled schedule of `trainer_id` on `date` whose time
/// range intersects the proposed one. `exclude` omits one schedule so an
/// edit is not checked against itself. Read-only.
pub async fn check_conflicts(
    store: &dyn ScheduleStore,
    trainer_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    exclude: Option<Uuid>,
) -> StoreResult<ConflictReport> {
    let existing = store.schedules_for_trainer_on(trainer_id, date).await?;

    let conflicts: Vec<Schedule> = existing
        .into_iter()
        .filter(|s| Some(s.id) != exclude)
        .filter(|s| !s.is_cancelled())
        .filter(|s| intervals_overlap(s.start_time, s.end_time, start_time, end_time))
        .collect();

    Ok(ConflictReport {
        has_conflict: !conflicts.is_empty(),
        conflicts,
    })
}

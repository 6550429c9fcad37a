//! JSON endpoints consumed by the trainer UI. Everything returns the
//! `{success, data|error}` envelope; no exception crosses this boundary.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::Error;
use crate::functions::ScheduleService;
use crate::schema::{RecurringPattern, ScheduleChanges, ScheduleDraft};
use crate::store::ScheduleStore;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScheduleService>,
    pub store: Arc<dyn ScheduleStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/schedules", post(create_schedule).get(list_schedules))
        .route(
            "/schedules/{id}",
            get(get_schedule)
                .patch(update_schedule)
                .delete(delete_schedule),
        )
        .route("/schedules/{id}/cancel", post(cancel_schedule))
        .route(
            "/schedules/{id}/notifications",
            post(create_notifications).get(list_notifications),
        )
        .route("/conflicts/check", post(check_conflicts))
        .route("/recurrence/preview", post(preview_recurrence))
        .with_state(state)
}

fn success<T: serde::Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ConflictCheckUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut error = json!({ "code": self.code(), "message": self.to_string() });
        if let Error::Conflict { conflicts } = &self {
            error["conflicts"] = json!(conflicts);
        }

        (status, Json(json!({ "success": false, "error": error }))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let healthy = state.store.health_check().await?;
    Ok(success(json!({ "healthy": healthy })))
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(draft): Json<ScheduleDraft>,
) -> Result<Json<serde_json::Value>, Error> {
    let rows = state.service.create(draft).await?;
    Ok(success(json!({ "count": rows.len(), "schedules": rows })))
}

#[derive(Deserialize)]
struct DayQuery {
    trainer_id: Uuid,
    date: NaiveDate,
}

async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<serde_json::Value>, Error> {
    let rows = state
        .service
        .day_listing(query.trainer_id, query.date)
        .await?;
    Ok(success(rows))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    Ok(success(state.service.get(id).await?))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<ScheduleChanges>,
) -> Result<Json<serde_json::Value>, Error> {
    Ok(success(state.service.update(id, changes).await?))
}

#[derive(Deserialize)]
struct CancelRequest {
    reason: String,
    cancelled_by: String,
}

async fn cancel_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    let schedule = state
        .service
        .cancel(id, request.reason, request.cancelled_by)
        .await?;
    Ok(success(schedule))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    state.service.delete(id).await?;
    Ok(success(json!({ "deleted": true })))
}

async fn create_notifications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    let count = state.service.create_notifications(id).await?;
    Ok(success(json!({ "count": count })))
}

async fn list_notifications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    Ok(success(state.service.notifications(id).await?))
}

#[derive(Deserialize)]
struct ConflictQuery {
    trainer_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    #[serde(default)]
    exclude_id: Option<Uuid>,
}

async fn check_conflicts(
    State(state): State<AppState>,
    Json(query): Json<ConflictQuery>,
) -> Result<Json<serde_json::Value>, Error> {
    let report = state
        .service
        .probe_conflicts(
            query.trainer_id,
            query.date,
            query.start_time,
            query.end_time,
            query.exclude_id,
        )
        .await?;
    Ok(success(report))
}

#[derive(Deserialize)]
struct PreviewRequest {
    start_date: NaiveDate,
    pattern: RecurringPattern,
}

async fn preview_recurrence(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    let dates = state
        .service
        .preview_recurrence(request.start_date, &request.pattern)?;
    Ok(success(dates))
}

//! Appointment routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{admin_only, ApiResult, AppState, AuthUser};
use crate::model::{Appointment, AppointmentFilter, AppointmentStatus, NewReport};
use crate::service::{Completion, NewAppointment};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_one))
        .route("/{id}/confirm", post(confirm))
        .route("/{id}/start", post(start))
        .route("/{id}/complete", post(complete))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/no-show", post(no_show))
        .route("/{id}/reschedule", post(reschedule))
}

#[derive(Debug, Deserialize)]
struct AppointmentQuery {
    donor_id: Option<i64>,
    status: Option<AppointmentStatus>,
    request_id: Option<i64>,
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<AppointmentQuery>,
) -> ApiResult<Json<Vec<Appointment>>> {
    let filter = AppointmentFilter {
        donor_id: query.donor_id,
        status: query.status,
        request_id: query.request_id,
    };
    Ok(Json(state.bank()?.list_appointments(&user, &filter)?))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(new): Json<NewAppointment>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let appointment = state
        .bank()?
        .schedule_appointment(&user, &new, Utc::now())?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.bank()?.view_appointment(&user, id)?))
}

async fn confirm(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Appointment>> {
    admin_only(&user)?;
    Ok(Json(state.bank()?.confirm_appointment(id, Utc::now())?))
}

async fn start(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Appointment>> {
    admin_only(&user)?;
    Ok(Json(state.bank()?.start_appointment(id, Utc::now())?))
}

#[derive(Debug, Deserialize)]
struct CompleteBody {
    units: u32,
    #[serde(default)]
    report: Option<NewReport>,
}

async fn complete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<CompleteBody>,
) -> ApiResult<Json<Completion>> {
    admin_only(&user)?;
    let completion = state
        .bank()?
        .complete_appointment(id, body.units, body.report, Utc::now())?;
    Ok(Json(completion))
}

#[derive(Debug, Default, Deserialize)]
struct CancelBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn cancel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    body: Option<Json<CancelBody>>,
) -> ApiResult<Json<Appointment>> {
    let Json(body) = body.unwrap_or_default();
    let appointment =
        state
            .bank()?
            .cancel_appointment(&user, id, body.reason.as_deref(), Utc::now())?;
    Ok(Json(appointment))
}

async fn no_show(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Appointment>> {
    admin_only(&user)?;
    Ok(Json(state.bank()?.mark_appointment_no_show(id, Utc::now())?))
}

#[derive(Debug, Deserialize)]
struct RescheduleBody {
    scheduled_at: DateTime<Utc>,
}

async fn reschedule(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<RescheduleBody>,
) -> ApiResult<Json<Appointment>> {
    let appointment =
        state
            .bank()?
            .reschedule_appointment(&user, id, body.scheduled_at, Utc::now())?;
    Ok(Json(appointment))
}

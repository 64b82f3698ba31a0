//! Blood request and donor notification routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{admin_only, parse_group, ApiResult, AppState, AuthUser};
use crate::model::{
    BloodRequest, NewRequest, Notification, NotificationResponse, RequestFilter, RequestStatus,
};
use crate::service::{Approval, ResponseOutcome};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/{id}", get(get_request))
        .route("/{id}/approve", post(approve))
        .route("/{id}/reject", post(reject))
        .route("/{id}/collect", post(collect))
        .route("/{id}/no-show", post(no_show))
        .route("/{id}/notify-donors", post(notify_donors))
}

pub(super) fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/{id}/read", post(mark_read))
        .route("/{id}/respond", post(respond))
}

/// Queue freshly created notifications for delivery.
fn dispatch(state: &AppState, notifications: &[Notification]) {
    if !notifications.is_empty() {
        let queued = state.dispatcher().dispatch(notifications.iter().cloned());
        debug!(queued, "Queued donor notifications");
    }
}

async fn create_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(new): Json<NewRequest>,
) -> ApiResult<(StatusCode, Json<BloodRequest>)> {
    let request = state.bank()?.create_request(&user, &new, Utc::now())?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize)]
struct RequestQuery {
    status: Option<RequestStatus>,
    blood_group: Option<String>,
    requester_id: Option<i64>,
}

async fn list_requests(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<RequestQuery>,
) -> ApiResult<Json<Vec<BloodRequest>>> {
    let filter = RequestFilter {
        status: query.status,
        blood_group: parse_group(query.blood_group.as_deref())?,
        requester_id: query.requester_id,
    };
    Ok(Json(state.bank()?.list_requests(&user, &filter)?))
}

async fn get_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BloodRequest>> {
    Ok(Json(state.bank()?.get_request(&user, id)?))
}

fn notify_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ApproveBody {
    #[serde(default = "notify_by_default")]
    notify_donors: bool,
}

async fn approve(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    body: Option<Json<ApproveBody>>,
) -> ApiResult<Json<Approval>> {
    let notify = body.map_or(true, |Json(b)| b.notify_donors);
    let approval = state
        .bank()?
        .approve_request(&user, id, Utc::now(), notify)?;
    dispatch(&state, &approval.notifications);
    Ok(Json(approval))
}

#[derive(Debug, Default, Deserialize)]
struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn reject(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<Json<BloodRequest>> {
    let Json(body) = body.unwrap_or_default();
    let request = state
        .bank()?
        .reject_request(&user, id, body.reason.as_deref(), Utc::now())?;
    Ok(Json(request))
}

async fn collect(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BloodRequest>> {
    Ok(Json(state.bank()?.mark_collected(&user, id, Utc::now())?))
}

async fn no_show(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BloodRequest>> {
    Ok(Json(state.bank()?.mark_no_show(&user, id, Utc::now())?))
}

async fn notify_donors(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Notification>>> {
    admin_only(&user)?;
    let notifications = state.bank()?.notify_donors(id, Utc::now())?;
    dispatch(&state, &notifications);
    Ok(Json(notifications))
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    donor_id: Option<i64>,
    #[serde(default)]
    unread_only: bool,
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.bank()?.list_notifications(
        &user,
        query.donor_id,
        query.unread_only,
    )?))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.bank()?.mark_read(&user, id, Utc::now())?))
}

#[derive(Debug, Deserialize)]
struct RespondBody {
    response: NotificationResponse,
    #[serde(default)]
    scheduled_at: Option<DateTime<Utc>>,
}

async fn respond(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<RespondBody>,
) -> ApiResult<Json<ResponseOutcome>> {
    let outcome = state
        .bank()?
        .respond(&user, id, body.response, body.scheduled_at, Utc::now())?;
    Ok(Json(outcome))
}

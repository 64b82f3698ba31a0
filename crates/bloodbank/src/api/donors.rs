//! Donor profile routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{admin_only, parse_group, ApiResult, AppState, AuthUser};
use crate::error::{Error, Result};
use crate::model::{Donor, DonorFilter, DonorUpdate, Eligibility, MedicalReport, NewDonor, Role, User};
use crate::service::BloodBank;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_donors).post(create_donor))
        .route("/me", get(my_profile))
        .route("/{id}", get(get_donor).patch(update_donor))
        .route("/{id}/eligibility", get(eligibility))
        .route("/{id}/reports", get(reports))
}

/// Admins see every donor; donors only their own profile.
fn visible_donor(bank: &BloodBank, viewer: &User, id: i64) -> Result<Donor> {
    let donor = bank.get_donor(id)?;
    match viewer.role {
        Role::Admin => Ok(donor),
        Role::Donor if donor.user_id == Some(viewer.id) => Ok(donor),
        _ => Err(Error::not_found("donor", id)),
    }
}

async fn create_donor(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(mut new): Json<NewDonor>,
) -> ApiResult<(StatusCode, Json<Donor>)> {
    match user.role {
        Role::Admin => {}
        // Donors create their own profile
        Role::Donor => new.user_id = Some(user.id),
        Role::Hospital => return Err(Error::forbidden("hospital accounts cannot register donors").into()),
    }
    let donor = state.bank()?.register_donor(&new, Utc::now())?;
    Ok((StatusCode::CREATED, Json(donor)))
}

#[derive(Debug, Deserialize)]
struct DonorQuery {
    blood_group: Option<String>,
    available: Option<bool>,
    eligible_on: Option<NaiveDate>,
    city: Option<String>,
}

async fn list_donors(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<DonorQuery>,
) -> ApiResult<Json<Vec<Donor>>> {
    admin_only(&user)?;
    let filter = DonorFilter {
        blood_group: parse_group(query.blood_group.as_deref())?,
        available: query.available,
        eligible_on: query.eligible_on,
        city: query.city,
    };
    Ok(Json(state.bank()?.list_donors(&filter)?))
}

async fn my_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Donor>> {
    Ok(Json(state.bank()?.donor_for_user(user.id)?))
}

async fn get_donor(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Donor>> {
    let bank = state.bank()?;
    Ok(Json(visible_donor(&bank, &user, id)?))
}

async fn update_donor(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<DonorUpdate>,
) -> ApiResult<Json<Donor>> {
    let bank = state.bank()?;
    visible_donor(&bank, &user, id)?;
    Ok(Json(bank.update_donor(id, &patch)?))
}

#[derive(Debug, Deserialize)]
struct EligibilityQuery {
    on: Option<NaiveDate>,
}

async fn eligibility(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<EligibilityQuery>,
) -> ApiResult<Json<Eligibility>> {
    let bank = state.bank()?;
    visible_donor(&bank, &user, id)?;
    let day = query.on.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(bank.eligibility(id, day)?))
}

async fn reports(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<MedicalReport>>> {
    Ok(Json(state.bank()?.reports_for_donor(&user, id)?))
}

//! Registration, login and account approval routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{admin_only, ApiResult, AppState, AuthUser};
use crate::model::{NewUser, User, UserStatus};

pub(super) fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

pub(super) fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/approve", post(approve_user))
        .route("/users/{id}/reject", post(reject_user))
}

async fn register(
    State(state): State<AppState>,
    Json(new): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.bank()?.register(&new, Utc::now())?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    token_type: &'static str,
    expires_in: u64,
    user: User,
}

async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, token) =
        state
            .bank()?
            .login(&credentials.email, &credentials.password, Utc::now())?;
    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: state.config().token_ttl().as_secs(),
        user,
    }))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    status: Option<UserStatus>,
}

async fn list_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<User>>> {
    admin_only(&user)?;
    Ok(Json(state.bank()?.list_users(query.status)?))
}

async fn approve_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.bank()?.approve_user(&admin, id)?))
}

async fn reject_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.bank()?.reject_user(&admin, id)?))
}

//! Inventory routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{admin_only, parse_group, ApiResult, AppState, AuthUser};
use crate::error::Error;
use crate::model::{InventoryLot, InventorySummary, LedgerMismatch, LotFilter, Movement, NewLot, Role, User};

/// Default number of ledger rows returned.
const DEFAULT_MOVEMENTS: usize = 100;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lots).post(add_lot))
        .route("/summary", get(summary))
        .route("/expire", post(expire))
        .route("/movements", get(movements))
        .route("/reconcile", get(reconcile))
        .route("/{id}", get(get_lot))
        .route("/{id}/adjust", post(adjust))
}

/// Staff and hospitals may look at stock; donors may not.
fn can_view_stock(user: &User) -> Result<(), Error> {
    match user.role {
        Role::Admin | Role::Hospital => Ok(()),
        Role::Donor => Err(Error::forbidden("donor accounts cannot view inventory")),
    }
}

#[derive(Debug, Deserialize)]
struct LotQuery {
    blood_group: Option<String>,
    usable_on: Option<NaiveDate>,
}

async fn list_lots(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<LotQuery>,
) -> ApiResult<Json<Vec<InventoryLot>>> {
    can_view_stock(&user)?;
    let filter = LotFilter {
        blood_group: parse_group(query.blood_group.as_deref())?,
        usable_on: query.usable_on,
    };
    Ok(Json(state.bank()?.list_lots(&filter)?))
}

async fn add_lot(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(new): Json<NewLot>,
) -> ApiResult<(StatusCode, Json<InventoryLot>)> {
    admin_only(&user)?;
    let lot = state.bank()?.add_lot(&new, Utc::now())?;
    Ok((StatusCode::CREATED, Json(lot)))
}

async fn get_lot(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<InventoryLot>> {
    can_view_stock(&user)?;
    Ok(Json(state.bank()?.get_lot(id)?))
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    on: Option<NaiveDate>,
}

async fn summary(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<InventorySummary>> {
    can_view_stock(&user)?;
    let day = query.on.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(state.bank()?.inventory_summary(day)?))
}

#[derive(Debug, Deserialize)]
struct Adjustment {
    delta: i64,
    #[serde(default)]
    note: Option<String>,
}

async fn adjust(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(adjustment): Json<Adjustment>,
) -> ApiResult<Json<InventoryLot>> {
    admin_only(&user)?;
    let lot = state
        .bank()?
        .adjust_lot(id, adjustment.delta, adjustment.note.as_deref(), Utc::now())?;
    Ok(Json(lot))
}

#[derive(Debug, Serialize)]
struct Expired {
    lots: u32,
    units: u32,
}

async fn expire(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Expired>> {
    admin_only(&user)?;
    let (lots, units) = state.bank()?.expire_lots(Utc::now())?;
    Ok(Json(Expired { lots, units }))
}

#[derive(Debug, Deserialize)]
struct MovementQuery {
    lot_id: Option<i64>,
    limit: Option<usize>,
}

async fn movements(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<MovementQuery>,
) -> ApiResult<Json<Vec<Movement>>> {
    admin_only(&user)?;
    let limit = query.limit.unwrap_or(DEFAULT_MOVEMENTS);
    Ok(Json(state.bank()?.movements(query.lot_id, limit)?))
}

async fn reconcile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<LedgerMismatch>>> {
    admin_only(&user)?;
    Ok(Json(state.bank()?.reconcile()?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    use super::super::testing::*;

    #[tokio::test]
    async fn test_add_adjust_and_ledger() {
        let app = test_app();
        let today = Utc::now().date_naive().to_string();

        let (status, lot) = app
            .post(
                "/api/inventory",
                &app.admin_token,
                json!({ "blood_group": "B-", "units": 4, "collected_on": today }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{lot}");
        let id = lot["id"].as_i64().unwrap();

        let (status, adjusted) = app
            .post(
                &format!("/api/inventory/{id}/adjust"),
                &app.admin_token,
                json!({ "delta": -1, "note": "broken bag" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(adjusted["units"], 3);

        let (status, body) = app
            .post(
                &format!("/api/inventory/{id}/adjust"),
                &app.admin_token,
                json!({ "delta": -10 }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");

        let (_, movements) = app
            .get(&format!("/api/inventory/movements?lot_id={id}"), &app.admin_token)
            .await;
        assert_eq!(movements.as_array().unwrap().len(), 2);

        let (_, mismatches) = app.get("/api/inventory/reconcile", &app.admin_token).await;
        assert!(mismatches.as_array().unwrap().is_empty());

        let (_, summary) = app.get("/api/inventory/summary", &app.admin_token).await;
        let groups = summary["groups"].as_array().unwrap();
        assert_eq!(groups.len(), 8);
        let b_neg = groups.iter().find(|g| g["blood_group"] == "B-").unwrap();
        assert_eq!(b_neg["units"], 3);
    }

    #[tokio::test]
    async fn test_inventory_permissions() {
        let app = test_app();
        let (_, hospital) = app.account("h@example.org", "hospital").await;
        let (_, donor) = app.account("d@example.org", "donor").await;

        let (status, _) = app.get("/api/inventory/summary", &hospital).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get("/api/inventory", &donor).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .post(
                "/api/inventory",
                &hospital,
                json!({ "blood_group": "A+", "units": 1, "collected_on": "2024-01-01" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

//! Medical report routes, including attachment upload and download.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use super::{ApiResult, AppState, AuthUser};
use crate::model::{MedicalReport, NewReport};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(get_one))
        .route("/{id}/attachment", get(download).put(upload))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(new): Json<NewReport>,
) -> ApiResult<(StatusCode, Json<MedicalReport>)> {
    let report = state.bank()?.add_report(&user, &new, Utc::now())?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MedicalReport>> {
    Ok(Json(state.bank()?.get_report(&user, id)?))
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    file_name: String,
}

async fn upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<Json<MedicalReport>> {
    let report = state
        .bank()?
        .attach_file(&user, id, &query.file_name, &body)?;
    Ok(Json(report))
}

async fn download(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let (attachment, content) = state.bank()?.attachment_bytes(&user, id)?;

    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        attachment.file_name
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use super::super::testing::*;

    #[tokio::test]
    async fn test_report_with_attachment() {
        let app = test_app();
        let (_, donor) = app
            .post(
                "/api/donors",
                &app.admin_token,
                json!({
                    "name": "Ann Lee",
                    "phone": "+44 20 7946 0000",
                    "blood_group": "B+",
                    "date_of_birth": "1980-02-02",
                    "weight_kg": 60.0,
                }),
            )
            .await;
        let donor_id = donor["id"].as_i64().unwrap();

        let (status, report) = app
            .post(
                "/api/reports",
                &app.admin_token,
                json!({ "donor_id": donor_id, "pulse_bpm": 64, "notes": "fit to donate" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{report}");
        let id = report["id"].as_i64().unwrap();

        let content = b"\x89PNG scan".to_vec();
        let upload = Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/reports/{id}/attachment?file_name=scan.png"))
            .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
            .body(Body::from(content.clone()))
            .unwrap();
        let response = app.app.clone().oneshot(upload).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let download = Request::builder()
            .uri(format!("/api/reports/{id}/attachment"))
            .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
            .body(Body::empty())
            .unwrap();
        let response = app.app.clone().oneshot(download).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), content.as_slice());

        let (_, reports) = app
            .get(&format!("/api/donors/{donor_id}/reports"), &app.admin_token)
            .await;
        assert_eq!(reports[0]["attachment"]["file_name"], "scan.png");

        std::fs::remove_dir_all(app.state.config().reports_dir()).unwrap();
    }

    #[tokio::test]
    async fn test_download_without_attachment() {
        let app = test_app();
        let (_, donor) = app
            .post(
                "/api/donors",
                &app.admin_token,
                json!({
                    "name": "Ann Lee",
                    "phone": "+44 20 7946 0000",
                    "blood_group": "B+",
                    "date_of_birth": "1980-02-02",
                    "weight_kg": 60.0,
                }),
            )
            .await;
        let (_, report) = app
            .post("/api/reports", &app.admin_token, json!({ "donor_id": donor["id"] }))
            .await;
        let id = report["id"].as_i64().unwrap();
        let (status, _) = app
            .get(&format!("/api/reports/{id}/attachment"), &app.admin_token)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

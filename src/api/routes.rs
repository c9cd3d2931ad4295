//! HTTP endpoints of the ingestion service.
//!
//! - `POST /api/uploads/excel`: multipart file or pre-parsed JSON rows
//! - `GET /api/uploads/excel?companyId=`: whether the tenant already holds data
//! - `DELETE /api/customers/:id/excel`: remove every booking and refund of a tenant

use std::collections::HashMap;

use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::api::{
    auth::require_admin,
    responses::{ApiError, ClearResponse, ExistsResponse},
    AppState,
};
use crate::application::ingestion_service::{UploadPayload, UploadRequest};
use crate::domain::models::{AdminSession, TenantId, UploadOutcome, UploadedFile, WriteMode};

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/uploads/excel", post(upload_excel).get(excel_exists))
        .route("/api/customers/:id/excel", delete(clear_customer_excel))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .merge(admin)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Body of a JSON upload whose rows were parsed on the client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonUpload {
    #[serde(alias = "clientId")]
    company_id: Option<Value>,
    #[serde(default)]
    overwrite: bool,
    mode: Option<String>,
    file_name: Option<String>,
    #[serde(default)]
    bookings: Vec<Map<String, Value>>,
    #[serde(default)]
    refunds: Vec<Map<String, Value>>,
}

struct DecodedUpload {
    tenant: TenantId,
    mode: WriteMode,
    payload: UploadPayload,
}

async fn upload_excel(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    request: Request,
) -> Result<Json<UploadOutcome>, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let upload = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        decode_multipart(multipart).await?
    } else {
        let Json(body) = Json::<JsonUpload>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        decode_json(body)?
    };
    debug!("Decoded upload for tenant {} (mode {:?})", upload.tenant, upload.mode);

    let outcome = state
        .service
        .upload(UploadRequest {
            session,
            tenant: upload.tenant,
            mode: upload.mode,
            payload: upload.payload,
        })
        .await?;
    Ok(Json(outcome))
}

async fn decode_multipart(mut multipart: Multipart) -> Result<DecodedUpload, ApiError> {
    let mut file = None;
    let mut company_id = None;
    let mut overwrite = false;
    let mut mode = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| ApiError::validation(e.body_text()))?;
                let mut uploaded = UploadedFile::new(file_name, bytes.to_vec());
                uploaded.content_type = content_type;
                file = Some(uploaded);
            }
            "companyId" | "clientId" => {
                company_id = Some(field.text().await.map_err(|e| ApiError::validation(e.body_text()))?);
            }
            "overwrite" => {
                let value = field.text().await.map_err(|e| ApiError::validation(e.body_text()))?;
                overwrite = parse_flag(&value);
            }
            "mode" => {
                mode = Some(field.text().await.map_err(|e| ApiError::validation(e.body_text()))?);
            }
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    let tenant = match company_id {
        Some(raw) => parse_tenant(&raw)?,
        None => return Err(ApiError::validation("companyId is required")),
    };
    let file = file.ok_or_else(|| ApiError::validation("No file uploaded"))?;
    Ok(DecodedUpload {
        tenant,
        mode: resolve_mode(overwrite, mode.as_deref())?,
        payload: UploadPayload::File(file),
    })
}

fn decode_json(body: JsonUpload) -> Result<DecodedUpload, ApiError> {
    let tenant = match &body.company_id {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(TenantId)
            .ok_or_else(|| ApiError::validation(format!("Invalid companyId: {n}")))?,
        Some(Value::String(s)) => parse_tenant(s)?,
        _ => return Err(ApiError::validation("companyId is required")),
    };
    Ok(DecodedUpload {
        tenant,
        mode: resolve_mode(body.overwrite, body.mode.as_deref())?,
        payload: UploadPayload::Rows {
            file_name: body.file_name,
            bookings: body.bookings,
            refunds: body.refunds,
        },
    })
}

async fn excel_exists(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let raw = params
        .get("companyId")
        .or_else(|| params.get("clientId"))
        .ok_or_else(|| ApiError::validation("companyId is required"))?;
    let tenant = parse_tenant(raw)?;

    let counts = state.service.existing_data(&session, tenant).await?;
    Ok(Json(ExistsResponse {
        exists: counts.exists(),
        bookings: counts.bookings,
        refunds: counts.refunds,
    }))
}

async fn clear_customer_excel(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let tenant = parse_tenant(&id)?;
    let deleted = state.service.clear_tenant(&session, tenant).await?;
    info!("Admin {} cleared {} rows of tenant {}", session.admin_id, deleted, tenant);
    Ok(Json(ClearResponse { success: true, deleted }))
}

fn parse_tenant(raw: &str) -> Result<TenantId, ApiError> {
    raw.trim()
        .parse()
        .map(TenantId)
        .map_err(|_| ApiError::validation(format!("Invalid companyId: {raw}")))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// `overwrite` wins over an explicit mode.
fn resolve_mode(overwrite: bool, mode: Option<&str>) -> Result<WriteMode, ApiError> {
    if overwrite {
        return Ok(WriteMode::Replace);
    }
    match mode.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("skip") => Ok(WriteMode::Skip),
        Some("update") => Ok(WriteMode::Update),
        Some("replace") | Some("overwrite") => Ok(WriteMode::Replace),
        Some(other) => Err(ApiError::validation(format!("Unknown mode: {other}"))),
    }
}

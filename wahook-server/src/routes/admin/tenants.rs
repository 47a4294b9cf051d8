//! Tenant registration and settings.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{TenantRecord, TenantStore};
use crate::error::ServerError;
use crate::schemas::admin::tenant::{
    AutoReplyRequest, CreateTenantRequest, SetActiveRequest, TenantResponse,
};
use crate::state::AppState;

use super::tenant_or_404;

#[derive(OpenApi)]
#[openapi(
    paths(create_tenant, list_tenants, get_tenant, set_auto_reply, set_active),
    components(schemas(CreateTenantRequest, AutoReplyRequest, SetActiveRequest, TenantResponse))
)]
pub struct TenantsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route("/tenants/{id}", get(get_tenant))
        .route("/tenants/{id}/auto-reply", put(set_auto_reply))
        .route("/tenants/{id}/active", put(set_active))
}

#[utoipa::path(
    post,
    path = "/admin/tenants",
    tag = "admin",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant registered", body = TenantResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 409, description = "phone_number_id already registered"),
    )
)]
pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantResponse>), ServerError> {
    req.validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let record = TenantRecord::from_new(Uuid::new_v4().to_string(), req.into_new_tenant(), Utc::now());
    state.store.insert_tenant(record.clone()).await.map_err(|e| {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => ServerError::Conflict(format!(
                "phone_number_id {} is already registered",
                record.phone_number_id.as_deref().unwrap_or_default()
            )),
            _ => ServerError::Database(e),
        }
    })?;
    info!(tenant_id = %record.id, phone_number_id = ?record.phone_number_id, "tenant registered");
    Ok((StatusCode::CREATED, Json(record.to_response())))
}

#[utoipa::path(
    get,
    path = "/admin/tenants",
    tag = "admin",
    responses(
        (status = 200, description = "All tenants", body = Vec<TenantResponse>),
        (status = 401, description = "Missing or invalid admin token"),
    )
)]
pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TenantResponse>>, ServerError> {
    let tenants = state.store.list_tenants().await?;
    Ok(Json(tenants.iter().map(TenantRecord::to_response).collect()))
}

#[utoipa::path(
    get,
    path = "/admin/tenants/{id}",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Tenant", body = TenantResponse),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TenantResponse>, ServerError> {
    let tenant = tenant_or_404(&state, &id).await?;
    Ok(Json(tenant.to_response()))
}

#[utoipa::path(
    put,
    path = "/admin/tenants/{id}/auto-reply",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    request_body = AutoReplyRequest,
    responses(
        (status = 200, description = "Updated tenant", body = TenantResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn set_auto_reply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AutoReplyRequest>,
) -> Result<Json<TenantResponse>, ServerError> {
    req.validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let tenant = state
        .store
        .set_auto_reply(&id, req.enabled, req.message.as_deref())
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("tenant {id} not found")))?;
    info!(tenant_id = %id, enabled = req.enabled, "auto-reply updated");
    Ok(Json(tenant.to_response()))
}

#[utoipa::path(
    put,
    path = "/admin/tenants/{id}/active",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "Updated tenant", body = TenantResponse),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn set_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<TenantResponse>, ServerError> {
    let tenant = state
        .store
        .set_active(&id, req.active)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("tenant {id} not found")))?;
    info!(tenant_id = %id, active = req.active, "tenant activation changed");
    Ok(Json(tenant.to_response()))
}

//! Tenant contact book.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use utoipa::OpenApi;
use validator::Validate;

use crate::entities::{ContactStore, NewContact};
use crate::error::ServerError;
use crate::pipeline::normalize::canonical_wa_id;
use crate::schemas::admin::PageQuery;
use crate::schemas::admin::contact::{ContactResponse, CreateContactRequest, SetBlockedRequest};
use crate::state::AppState;

use super::tenant_or_404;

#[derive(OpenApi)]
#[openapi(
    paths(list_contacts, create_contact, set_blocked),
    components(schemas(ContactResponse, CreateContactRequest, SetBlockedRequest))
)]
pub struct ContactsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants/{id}/contacts", get(list_contacts).post(create_contact))
        .route("/tenants/{id}/contacts/{wa_id}/blocked", put(set_blocked))
}

#[utoipa::path(
    get,
    path = "/admin/tenants/{id}/contacts",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id"), PageQuery),
    responses(
        (status = 200, description = "Most recently active first", body = Vec<ContactResponse>),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ContactResponse>>, ServerError> {
    let tenant = tenant_or_404(&state, &id).await?;
    let (_, limit, offset) = page.resolve();
    let contacts = state.store.list_contacts(&tenant.id, limit, offset).await?;
    Ok(Json(contacts.iter().map(|c| c.to_response()).collect()))
}

#[utoipa::path(
    post,
    path = "/admin/tenants/{id}/contacts",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    request_body = CreateContactRequest,
    responses(
        (status = 200, description = "Created or renamed contact", body = ContactResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateContactRequest>,
) -> Result<Json<ContactResponse>, ServerError> {
    req.validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let tenant = tenant_or_404(&state, &id).await?;
    let contact = state
        .store
        .create_contact(&tenant.id, &NewContact {
            wa_id: canonical_wa_id(&req.wa_id),
            name: req.name,
            opt_in_source: req.opt_in_source,
        })
        .await?;
    Ok(Json(contact.to_response()))
}

#[utoipa::path(
    put,
    path = "/admin/tenants/{id}/contacts/{wa_id}/blocked",
    tag = "admin",
    params(
        ("id" = String, Path, description = "Tenant id"),
        ("wa_id" = String, Path, description = "Contact WhatsApp id"),
    ),
    request_body = SetBlockedRequest,
    responses(
        (status = 200, description = "Updated contact", body = ContactResponse),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Contact not found"),
    )
)]
pub async fn set_blocked(
    State(state): State<Arc<AppState>>,
    Path((id, wa_id)): Path<(String, String)>,
    Json(req): Json<SetBlockedRequest>,
) -> Result<Json<ContactResponse>, ServerError> {
    let wa_id = canonical_wa_id(&wa_id);
    let contact = state
        .store
        .set_blocked(&id, &wa_id, req.blocked)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("contact {wa_id} not found")))?;
    Ok(Json(contact.to_response()))
}

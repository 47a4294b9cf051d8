//! Message history and outbound sends.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};
use utoipa::OpenApi;
use validator::Validate;

use crate::dispatch::send_and_record;
use crate::dispatch::sender::Credentials;
use crate::entities::{MessageContent, MessageStore, TenantStore};
use crate::error::ServerError;
use crate::pipeline::normalize::canonical_wa_id;
use crate::schemas::admin::PageQuery;
use crate::schemas::admin::message::{
    MessageContextResponse, MessageErrorResponse, MessageListQuery, MessagePage, MessageResponse,
    SendTemplateRequest, SendTextRequest,
};
use crate::state::AppState;

use super::tenant_or_404;

#[derive(OpenApi)]
#[openapi(
    paths(list_messages, get_message, send_message, send_template),
    components(schemas(
        MessageResponse,
        MessagePage,
        MessageErrorResponse,
        MessageContextResponse,
        SendTextRequest,
        SendTemplateRequest
    ))
)]
pub struct MessagesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants/{id}/messages", get(list_messages).post(send_message))
        .route("/tenants/{id}/messages/template", post(send_template))
        .route("/tenants/{id}/messages/{message_id}", get(get_message))
}

#[utoipa::path(
    get,
    path = "/admin/tenants/{id}/messages",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id"), MessageListQuery),
    responses(
        (status = 200, description = "Newest first", body = MessagePage),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<MessagePage>, ServerError> {
    let tenant = tenant_or_404(&state, &id).await?;
    let (page, limit, offset) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve();
    let contact = query
        .contact
        .as_deref()
        .map(canonical_wa_id)
        .filter(|c| !c.is_empty());

    let total = state
        .store
        .count_messages(&tenant.id, contact.as_deref())
        .await?;
    let messages = state
        .store
        .list_messages(&tenant.id, contact.as_deref(), limit, offset)
        .await?;
    Ok(Json(MessagePage {
        messages: messages.iter().map(|m| m.to_response()).collect(),
        page,
        limit,
        total,
        pages: (total + limit - 1) / limit,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/tenants/{id}/messages/{message_id}",
    tag = "admin",
    params(
        ("id" = String, Path, description = "Tenant id"),
        ("message_id" = String, Path, description = "Local message id"),
    ),
    responses(
        (status = 200, description = "Message", body = MessageResponse),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant or message not found"),
    )
)]
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path((id, message_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ServerError> {
    let message = state
        .store
        .get_message(&id, &message_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("message {message_id} not found")))?;
    Ok(Json(message.to_response()))
}

/// Send a text message on behalf of a tenant.
///
/// One credit is debited before the provider call and refunded when the
/// provider rejects the message.
#[utoipa::path(
    post,
    path = "/admin/tenants/{id}/messages",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    request_body = SendTextRequest,
    responses(
        (status = 201, description = "Accepted by the provider", body = MessageResponse),
        (status = 400, description = "Invalid request or missing credentials"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 402, description = "No message credits left"),
        (status = 403, description = "Tenant inactive"),
        (status = 404, description = "Tenant not found"),
        (status = 502, description = "Provider rejected or unreachable"),
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendTextRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ServerError> {
    req.validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    send_content(&state, &id, &req.to, MessageContent::Text { text: req.text }).await
}

/// Send an approved template on behalf of a tenant. Billed like a text send.
#[utoipa::path(
    post,
    path = "/admin/tenants/{id}/messages/template",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    request_body = SendTemplateRequest,
    responses(
        (status = 201, description = "Accepted by the provider", body = MessageResponse),
        (status = 400, description = "Invalid request or missing credentials"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 402, description = "No message credits left"),
        (status = 403, description = "Tenant inactive"),
        (status = 404, description = "Tenant not found"),
        (status = 502, description = "Provider rejected or unreachable"),
    )
)]
pub async fn send_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendTemplateRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ServerError> {
    req.validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let to = req.to.clone();
    send_content(&state, &id, &to, req.into_content()).await
}

async fn send_content(
    state: &AppState,
    id: &str,
    to: &str,
    content: MessageContent,
) -> Result<(StatusCode, Json<MessageResponse>), ServerError> {
    let tenant = tenant_or_404(state, id).await?;
    if !tenant.is_active {
        return Err(ServerError::Forbidden(format!("tenant {id} is inactive")));
    }
    let to = canonical_wa_id(to);
    let creds = Credentials::for_tenant(&tenant, state.config.default_access_token.as_deref())?;

    if !state.store.debit_credit(&tenant.id).await? {
        return Err(ServerError::InsufficientCredits(format!(
            "tenant {id} has no message credits left"
        )));
    }

    let result = send_and_record(
        &state.store,
        state.sender.as_ref(),
        &state.realtime,
        &creds,
        &tenant,
        &to,
        content,
    )
    .await;

    match result {
        Ok(message) => {
            info!(tenant_id = %tenant.id, message_id = %message.id, to = %to, "message sent");
            Ok((StatusCode::CREATED, Json(message.to_response())))
        }
        Err(e) => {
            if let Err(refund) = state.store.refund_credit(&tenant.id).await {
                warn!(tenant_id = %tenant.id, error = %refund, "credit refund failed");
            }
            Err(e.into())
        }
    }
}

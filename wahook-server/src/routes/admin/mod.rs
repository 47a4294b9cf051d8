pub mod contacts;
pub mod events;
pub mod messages;
pub mod tenants;

use crate::entities::{TenantRecord, TenantStore};
use crate::error::ServerError;
use crate::middleware::auth;
use crate::state::AppState;

use axum::{
    Router,
    middleware::{self},
};
use std::sync::Arc;
use utoipa::OpenApi;

// Routes nested under `/admin` (tenants, messages, contacts, events).
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(tenants::router())
        .merge(messages::router())
        .merge(contacts::router())
        .merge(events::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi()]
pub struct AdminApi;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut docs = AdminApi::openapi();
    docs.merge(tenants::TenantsApi::openapi());
    docs.merge(messages::MessagesApi::openapi());
    docs.merge(contacts::ContactsApi::openapi());
    docs.merge(events::EventsApi::openapi());
    docs
}

pub(crate) async fn tenant_or_404(state: &AppState, id: &str) -> Result<TenantRecord, ServerError> {
    state
        .store
        .get_tenant(id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("tenant {id} not found")))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Server-Sent Events view of a tenant's real-time channel.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

use super::tenant_or_404;

#[derive(OpenApi)]
#[openapi(paths(stream_events))]
pub struct EventsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tenants/{id}/events", get(stream_events))
}

/// `new-message` and `message-status` events as they happen. Nothing is
/// replayed; a client that falls behind skips the events it missed.
#[utoipa::path(
    get,
    path = "/admin/tenants/{id}/events",
    tag = "admin",
    params(("id" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Tenant not found"),
    )
)]
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let tenant = tenant_or_404(&state, &id).await?;
    let channel = tenant.channel();
    info!(tenant_id = %tenant.id, "event stream opened");

    let stream = BroadcastStream::new(state.realtime.subscribe(&channel)).filter_map(move |item| {
        match item {
            Ok(event) => match Event::default().event(event.event.clone()).json_data(&event.payload) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    warn!(channel = %event.channel, error = %e, "unserialisable event skipped");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(channel = %channel, skipped, "event stream lagged");
                None
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

//! Provider-facing webhook endpoints.
//!
//! `GET /webhook` answers the subscription handshake. `POST /webhook` is
//! signature-checked by [`crate::middleware::signature`], parsed, acknowledged
//! with 200 and then processed in a detached task, so nothing that happens
//! during processing can turn into a provider retry.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Router, middleware};
use tracing::{Instrument, info, info_span, warn};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::middleware::signature;
use crate::models::whatsapp::{VerifyQuery, WebhookPayload};
use crate::pipeline;
use crate::state::AppState;

pub const ACK_BODY: &str = "EVENT_RECEIVED";

#[derive(OpenApi)]
#[openapi(paths(verify_webhook, receive_webhook))]
pub struct WebhookApi;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // The signature check guards POST only; the handshake is unsigned.
    let receive = post(receive_webhook).layer(middleware::from_fn_with_state(
        state,
        signature::signature_middleware,
    ));
    Router::new().route("/webhook", get(verify_webhook).merge(receive))
}

/// Subscription handshake.
///
/// Echoes `hub.challenge` when `hub.verify_token` matches the configured
/// token and `hub.mode`, if given, is `subscribe`.
#[utoipa::path(
    get,
    path = "/webhook",
    tag = "webhook",
    params(
        ("hub.mode" = Option<String>, Query, description = "Expected to be `subscribe`"),
        ("hub.verify_token" = Option<String>, Query, description = "Shared verify token"),
        ("hub.challenge" = Option<String>, Query, description = "Value to echo back"),
    ),
    responses(
        (status = 200, description = "Challenge echoed", body = String, content_type = "text/plain"),
        (status = 403, description = "Token mismatch"),
    )
)]
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let mode_ok = query.mode.as_deref().is_none_or(|m| m == "subscribe");
    let token_ok = match (state.config.verify_token.as_deref(), query.verify_token.as_deref()) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };

    if mode_ok && token_ok {
        info!("webhook verified");
        let challenge = query.challenge.unwrap_or_default();
        return ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response();
    }
    warn!(mode = ?query.mode, "webhook verification failed");
    StatusCode::FORBIDDEN.into_response()
}

/// Webhook delivery.
///
/// Requires a valid `X-Hub-Signature-256`. Processing happens after the
/// response; unknown tenants and duplicate deliveries are still acknowledged.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "webhook",
    request_body(content = Object, description = "WhatsApp Business webhook payload"),
    params(
        ("X-Hub-Signature-256" = String, Header, description = "`sha256=<hex>` HMAC of the raw body"),
    ),
    responses(
        (status = 200, description = "Acknowledged", body = String, content_type = "text/plain"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or invalid signature"),
    )
)]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ServerError> {
    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("malformed webhook payload: {e}")))?;

    let span = info_span!("webhook", object = %payload.object, entries = payload.entry.len());
    tokio::spawn(
        async move {
            let summary = pipeline::process_payload(&state, payload).await;
            info!(?summary, "webhook processed");
        }
        .instrument(span),
    );

    Ok((StatusCode::OK, ACK_BODY))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::dispatch::sender::testing::RecordingSender;
    use crate::entities::{ContactStore, MessageStore, testing};
    use crate::middleware::signature::{SIGNATURE_HEADER, sign};
    use crate::state::test_state;

    const SECRET: &str = "app-secret";
    const PHONE_ID: &str = "106540352242922";

    async fn app() -> (Router, Arc<AppState>) {
        let config = Config {
            verify_token: Some("verify-me".into()),
            app_secret: Some(SECRET.into()),
            ..Config::default()
        };
        let (state, _worker) = test_state(config, Arc::new(RecordingSender::default())).await;
        let router = router(Arc::clone(&state)).with_state(Arc::clone(&state));
        (router, state)
    }

    fn body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "whatsapp_business_account",
            "entry": [{ "id": "WABA", "changes": [{ "field": "messages", "value": {
                "metadata": { "display_phone_number": "15550001111", "phone_number_id": PHONE_ID },
                "contacts": [{ "profile": { "name": "Asha" }, "wa_id": "919876543210" }],
                "messages": [{
                    "from": "919876543210", "id": "wamid.A", "timestamp": "1714557600",
                    "type": "text", "text": { "body": "Hi" }
                }]
            }}]}]
        }))
        .unwrap()
    }

    fn post(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut req = Request::post("/webhook").header("content-type", "application/json");
        if let Some(sig) = signature {
            req = req.header(SIGNATURE_HEADER, sig);
        }
        req.body(Body::from(body)).unwrap()
    }

    async fn text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn handshake_echoes_challenge() {
        let (app, _) = app().await;
        let resp = app
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(resp).await, "1158201444");
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_token_or_mode() {
        let (app, _) = app().await;
        for uri in [
            "/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1",
            "/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=1",
            "/webhook?hub.challenge=1",
        ] {
            let resp = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn handshake_accepts_plain_aliases() {
        let (app, _) = app().await;
        let resp = app
            .oneshot(
                Request::get("/webhook?verify_token=verify-me&challenge=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(resp).await, "abc");
    }

    #[tokio::test]
    async fn bad_or_missing_signature_is_401_and_stores_nothing() {
        let (app, state) = app().await;
        let tenant = testing::tenant(&state.store, PHONE_ID).await;

        let wrong = sign(b"not-the-secret", &body());
        for signature in [None, wrong, Some("sha256=deadbeef".to_owned())] {
            let resp = app.clone().oneshot(post(body(), signature)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.store.count_messages(&tenant.id, None).await.unwrap(), 0);
        assert!(state.store.get_contact(&tenant.id, "919876543210").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unset_app_secret_rejects_everything() {
        let (state, _worker) =
            test_state(Config::default(), Arc::new(RecordingSender::default())).await;
        let app = router(Arc::clone(&state)).with_state(state);
        let resp = app
            .oneshot(post(body(), sign(SECRET.as_bytes(), &body())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let (app, _) = app().await;
        let raw = b"{not json".to_vec();
        let signature = sign(SECRET.as_bytes(), &raw);
        let resp = app.oneshot(post(raw, signature)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_delivery_is_acknowledged_then_processed() {
        let (app, state) = app().await;
        let tenant = testing::tenant(&state.store, PHONE_ID).await;

        let resp = app
            .oneshot(post(body(), sign(SECRET.as_bytes(), &body())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(resp).await, ACK_BODY);

        let mut stored = None;
        for _ in 0..100 {
            stored = state.store.find_by_provider_id(&tenant.id, "wamid.A").await.unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stored.is_some(), "message was not processed");
    }

    #[tokio::test]
    async fn unknown_tenant_is_still_acknowledged() {
        let (app, _state) = app().await;
        let resp = app
            .oneshot(post(body(), sign(SECRET.as_bytes(), &body())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

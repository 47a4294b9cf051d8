//! `X-Hub-Signature-256` verification for `POST /webhook`.
//!
//! The provider signs the raw request body with the app secret using
//! HMAC-SHA256 and sends `sha256=<hex digest>`. Requests without a valid
//! signature are rejected with 401 before any processing; with no app secret
//! configured every request is rejected.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::ServerError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Upper bound on a webhook body; the provider batches far below this.
pub const MAX_WEBHOOK_BYTES: usize = 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// Constant-time check of `header` (`sha256=<hex>`) against `body`.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` for `body`, as the provider would send it.
pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub async fn signature_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(secret) = state.config.app_secret.as_deref() else {
        warn!("WAHOOK_APP_SECRET is not set; rejecting webhook");
        return ServerError::Unauthorized("webhook signature cannot be verified".into())
            .into_response();
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_WEBHOOK_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "unreadable webhook body");
            return ServerError::BadRequest("unreadable request body".into()).into_response();
        }
    };

    let header = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    match header {
        Some(h) if verify_signature(secret.as_bytes(), &bytes, h) => {}
        Some(_) => {
            warn!("webhook signature mismatch");
            return ServerError::Unauthorized("invalid signature".into()).into_response();
        }
        None => {
            warn!("webhook without signature header");
            return ServerError::Unauthorized("missing signature".into()).into_response();
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

// ── Tests ──────────────────────────────────────────────────────────────────────

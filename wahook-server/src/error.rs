//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! **Security note:** Database errors are logged with
//! full detail but only a generic message is returned to the caller so that
//! SQL or other implementation details never leak to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::dispatch::sender::SendError;

/// All errors that can occur in the wahook-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The outbound send collaborator rejected a message.
    #[error("send failed: {0}")]
    Send(#[from] SendError),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (webhook signature, admin token).
    #[error("unauthorised: {0}")]
    Unauthorized(String),

    /// Credentials were understood but do not grant access.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The tenant has no message credits left.
    #[error("insufficient credits: {0}")]
    InsufficientCredits(String),

    /// A unique key is already taken.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            ServerError::InsufficientCredits(m) => (StatusCode::PAYMENT_REQUIRED, m.clone()),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),

            // Provider rejections are relayed; transport failures are not.
            ServerError::Send(e) => {
                error!(error = %e, "outbound send failed");
                match e {
                    SendError::Provider { message, .. } => {
                        (StatusCode::BAD_GATEWAY, format!("provider rejected message: {message}"))
                    }
                    SendError::MissingCredentials(m) => (StatusCode::BAD_REQUEST, m.clone()),
                    _ => (StatusCode::BAD_GATEWAY, "provider unreachable".to_owned()),
                }
            }

            // Internal errors: log the full detail, return a generic message.
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn client_errors_keep_their_status() {
        let cases = [
            (ServerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServerError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServerError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (
                ServerError::InsufficientCredits("x".into()),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (ServerError::Conflict("x".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn database_errors_hide_their_detail() {
        use http_body_util::BodyExt;

        let resp = ServerError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "internal server error" }));
    }
}

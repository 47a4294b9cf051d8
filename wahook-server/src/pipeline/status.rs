use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::entities::{MessageError, MessageStatus, MessageStore, StatusOutcome, StatusUpdate, TenantRecord};
use crate::models::whatsapp::WaStatus;
use crate::state::AppState;

use super::normalize::provider_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusResult {
    Applied,
    Stale,
    UnknownMessage,
    /// Not a status this service tracks.
    Ignored,
    Failed,
}

/// Provider status → [`StatusUpdate`]. Only `sent`, `delivered`, `read` and
/// `failed` are tracked; anything else (`deleted`, `warning`, …) is `None`.
pub fn parse_status(status: &WaStatus, received_at: DateTime<Utc>) -> Option<StatusUpdate> {
    let parsed = match status.status.parse::<MessageStatus>() {
        Ok(MessageStatus::Pending) | Err(_) => return None,
        Ok(s) => s,
    };
    let error = if parsed == MessageStatus::Failed {
        status.errors.first().map(|e| MessageError {
            code: e.code_string(),
            message: e.description(),
        })
    } else {
        None
    };
    Some(StatusUpdate {
        provider_message_id: status.id.clone(),
        status: parsed,
        timestamp: provider_timestamp(status.timestamp.as_deref(), received_at),
        error,
    })
}

pub async fn process_status(state: &AppState, tenant: &TenantRecord, status: &WaStatus) -> StatusResult {
    let Some(update) = parse_status(status, Utc::now()) else {
        warn!(tenant_id = %tenant.id, wamid = %status.id, status = %status.status, "untracked status ignored");
        return StatusResult::Ignored;
    };
    let wamid = update.provider_message_id.as_str();

    match state.store.apply_status(&tenant.id, &update).await {
        Ok(StatusOutcome::Applied(message)) => {
            info!(tenant_id = %tenant.id, wamid, status = %update.status, "status applied");
            state.dispatcher.status_changed(tenant, &message);
            StatusResult::Applied
        }
        Ok(StatusOutcome::Stale { current }) => {
            debug!(tenant_id = %tenant.id, wamid, status = %update.status, current = %current, "stale status ignored");
            StatusResult::Stale
        }
        Ok(StatusOutcome::UnknownMessage) => {
            warn!(tenant_id = %tenant.id, wamid, status = %update.status, "status for unknown message dropped");
            StatusResult::UnknownMessage
        }
        Err(e) => {
            error!(tenant_id = %tenant.id, wamid, error = %e, "failed to apply status");
            StatusResult::Failed
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn wa_status(value: serde_json::Value) -> WaStatus {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn failed_status_takes_first_error() {
        let s = wa_status(json!({
            "id": "wamid.A", "status": "failed", "timestamp": "1714557700",
            "recipient_id": "919876543210",
            "errors": [
                { "code": 131026, "title": "Message undeliverable" },
                { "code": 1, "title": "second" }
            ]
        }));
        let update = parse_status(&s, Utc::now()).unwrap();
        assert_eq!(update.status, MessageStatus::Failed);
        assert_eq!(update.timestamp, Utc.timestamp_opt(1_714_557_700, 0).unwrap());
        let error = update.error.unwrap();
        assert_eq!(error.code.as_deref(), Some("131026"));
        assert_eq!(error.message.as_deref(), Some("Message undeliverable"));
    }

    #[test]
    fn errors_are_ignored_for_non_failed_statuses() {
        let s = wa_status(json!({
            "id": "wamid.A", "status": "delivered", "errors": [{ "code": 1 }]
        }));
        assert!(parse_status(&s, Utc::now()).unwrap().error.is_none());
    }

    #[test]
    fn untracked_statuses_are_none() {
        for raw in ["deleted", "warning", "pending", "READ"] {
            let s = wa_status(json!({ "id": "wamid.A", "status": raw }));
            assert!(parse_status(&s, Utc::now()).is_none(), "{raw}");
        }
    }
}

//! Webhook processing after acknowledgement.
//!
//! A payload fans out into `entry[].changes[]`; every `messages` change is
//! routed to exactly one tenant by its `phone_number_id`, then each inbound
//! message and each status callback in it is handled independently. Nothing
//! here returns an error: failures are logged with the tenant and message id
//! and the rest of the payload carries on.

pub mod inbound;
pub mod normalize;
pub mod status;
pub mod tenant;

use tracing::{debug, warn};

use crate::models::whatsapp::{MESSAGES_FIELD, MessagesValue, WABA_OBJECT, WebhookChange, WebhookPayload};
use crate::state::AppState;

use self::inbound::InboundOutcome;
use self::status::StatusResult;

/// What a payload amounted to; logged once per webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub changes: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub statuses_applied: usize,
    pub statuses_ignored: usize,
    /// Messages and statuses that could not be attributed or persisted.
    pub dropped: usize,
}

pub async fn process_payload(state: &AppState, payload: WebhookPayload) -> ProcessSummary {
    let mut summary = ProcessSummary::default();
    if payload.object != WABA_OBJECT {
        debug!(object = %payload.object, "not a WhatsApp Business payload; ignored");
        return summary;
    }

    for entry in payload.entry {
        for change in entry.changes {
            if change.field != MESSAGES_FIELD {
                debug!(field = %change.field, waba_id = ?entry.id, "change field ignored");
                continue;
            }
            summary.changes += 1;
            process_change(state, change, &mut summary).await;
        }
    }
    summary
}

async fn process_change(state: &AppState, change: WebhookChange, summary: &mut ProcessSummary) {
    let value: MessagesValue = match serde_json::from_value(change.value) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "malformed messages change; dropped");
            summary.dropped += 1;
            return;
        }
    };

    let phone_number_id = value.metadata.as_ref().and_then(|m| m.phone_number_id.as_deref());
    let Some(tenant) = tenant::resolve(state.store.as_ref(), phone_number_id).await else {
        summary.dropped += value.messages.len() + value.statuses.len();
        return;
    };
    let to_number = value
        .metadata
        .as_ref()
        .and_then(|m| m.display_phone_number.clone())
        .or_else(|| phone_number_id.map(str::to_owned))
        .unwrap_or_default();

    for message in &value.messages {
        match inbound::process_incoming(state, &tenant, &to_number, message, &value.contacts).await {
            InboundOutcome::Stored => summary.stored += 1,
            InboundOutcome::Duplicate => summary.duplicates += 1,
            InboundOutcome::Failed => summary.dropped += 1,
        }
    }

    for s in &value.statuses {
        match status::process_status(state, &tenant, s).await {
            StatusResult::Applied => summary.statuses_applied += 1,
            StatusResult::Stale | StatusResult::Ignored => summary.statuses_ignored += 1,
            StatusResult::UnknownMessage | StatusResult::Failed => summary.dropped += 1,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

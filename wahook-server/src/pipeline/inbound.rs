use chrono::Utc;
use tracing::{debug, error, info};

use crate::entities::{InsertOutcome, MessageStore, TenantRecord};
use crate::models::whatsapp::{WaContact, WaMessage};
use crate::state::AppState;

use super::normalize::{canonical_wa_id, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Stored,
    Duplicate,
    Failed,
}

/// Normalize, store once and count on the contact, then fan out.
///
/// Side effects fire only when the store reports `Created`, so a redelivered
/// webhook changes nothing. A failed write leaves no trace, and the
/// provider's next redelivery is processed as new.
pub async fn process_incoming(
    state: &AppState,
    tenant: &TenantRecord,
    to_number: &str,
    message: &WaMessage,
    contacts: &[WaContact],
) -> InboundOutcome {
    let normalized = normalize(message, Utc::now());
    let wamid = normalized.provider_message_id.as_str();
    let hint = profile_name_for(contacts, &normalized.from);

    let (record, contact) = match state
        .store
        .record_inbound(&tenant.id, to_number, &normalized, hint)
        .await
    {
        Ok(InsertOutcome::Created { message, contact }) => (message, contact),
        Ok(InsertOutcome::Duplicate) => {
            debug!(tenant_id = %tenant.id, wamid, "duplicate delivery ignored");
            return InboundOutcome::Duplicate;
        }
        Err(e) => {
            error!(tenant_id = %tenant.id, wamid, error = %e, "failed to store inbound message");
            return InboundOutcome::Failed;
        }
    };
    info!(
        tenant_id = %tenant.id,
        wamid,
        message_type = %record.message_type,
        from = %record.from_number,
        contact_messages = contact.total_messages,
        "inbound message stored"
    );

    state.dispatcher.message_received(tenant, &record, &contact);
    InboundOutcome::Stored
}

/// Profile name of the sender from the change's `contacts` array, falling back
/// to the first entry.
fn profile_name_for<'a>(contacts: &'a [WaContact], wa_id: &str) -> Option<&'a str> {
    contacts
        .iter()
        .find(|c| canonical_wa_id(&c.wa_id) == wa_id)
        .or_else(|| contacts.first())
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.as_deref())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::whatsapp::WaProfile;

    fn contact(wa_id: &str, name: &str) -> WaContact {
        WaContact {
            wa_id: wa_id.into(),
            profile: Some(WaProfile {
                name: Some(name.into()),
            }),
        }
    }

    #[test]
    fn profile_name_matches_sender_then_first() {
        let contacts = [contact("111", "One"), contact("222", "Two")];
        assert_eq!(profile_name_for(&contacts, "222"), Some("Two"));
        assert_eq!(profile_name_for(&contacts, "333"), Some("One"));
        assert_eq!(profile_name_for(&[], "333"), None);
    }
}

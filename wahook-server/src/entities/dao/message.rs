use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use super::contact::ContactRecord;

/// Delivery status of a message.
///
/// Forward progression is `pending → sent → delivered → read`; `failed` can
/// only be entered from `pending` or `sent`. `read` and `failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Statuses a message may be in for `self` to be applied.
    pub fn predecessors(self) -> &'static [MessageStatus] {
        use MessageStatus::*;
        match self {
            Pending => &[],
            Sent => &[Pending],
            Delivered => &[Pending, Sent],
            Read => &[Pending, Sent, Delivered],
            Failed => &[Pending, Sent],
        }
    }

    /// Column holding the time this status was entered.
    pub(crate) fn timestamp_column(self) -> Option<&'static str> {
        match self {
            MessageStatus::Pending => None,
            MessageStatus::Sent => Some("sent_at"),
            MessageStatus::Delivered => Some("delivered_at"),
            MessageStatus::Read => Some("read_at"),
            MessageStatus::Failed => Some("failed_at"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Interactive,
    Template,
    Reaction,
    Other,
}

/// Media reference carried by image, video, audio, document and sticker
/// messages. The id is resolved to a URL by the media collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaContent {
    pub media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContent {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A user's answer to an interactive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractiveReply {
    ButtonReply {
        button_id: String,
        button_title: String,
    },
    ListReply {
        list_id: String,
        list_title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list_description: Option<String>,
    },
}

/// Canonical message body, one variant per message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    Document(MediaContent),
    Sticker(MediaContent),
    Location(LocationContent),
    Interactive {
        reply: InteractiveReply,
    },
    Reaction {
        message_id: String,
        /// `None` when the reaction was removed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<String>,
    },
    Template {
        name: String,
        language: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        components: Value,
    },
    /// Anything not understood, kept verbatim with the provider's type tag.
    Other {
        provider_type: String,
        raw: Value,
    },
}

impl MessageContent {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageContent::Text { .. } => MessageType::Text,
            MessageContent::Image(_) => MessageType::Image,
            MessageContent::Video(_) => MessageType::Video,
            MessageContent::Audio(_) => MessageType::Audio,
            MessageContent::Document(_) => MessageType::Document,
            MessageContent::Sticker(_) => MessageType::Sticker,
            MessageContent::Location(_) => MessageType::Location,
            MessageContent::Interactive { .. } => MessageType::Interactive,
            MessageContent::Reaction { .. } => MessageType::Reaction,
            MessageContent::Template { .. } => MessageType::Template,
            MessageContent::Other { .. } => MessageType::Other,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Error attached to a failed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Reply-to reference of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// A row in the `messages` table.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub tenant_id: String,
    /// Provider-assigned id (`wamid.…`); `None` for outbound rows not yet
    /// acknowledged by the provider.
    pub provider_message_id: Option<String>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub from_number: String,
    pub to_number: String,
    pub content: MessageContent,
    pub status: MessageStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<MessageError>,
    pub context: Option<MessageContext>,
    pub provider_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An inbound message after normalization, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub provider_message_id: String,
    /// Sender's WhatsApp id.
    pub from: String,
    pub content: MessageContent,
    /// Provider-side send time.
    pub timestamp: DateTime<Utc>,
    pub context: Option<MessageContext>,
}

/// Result of [`crate::entities::MessageStore::record_inbound`].
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The message is new and has been counted on `contact`.
    Created {
        message: MessageRecord,
        contact: ContactRecord,
    },
    /// A row with the same provider id already exists for the tenant.
    Duplicate,
}

/// A delivery-status callback, already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub provider_message_id: String,
    pub status: MessageStatus,
    /// Provider event time; stored in the status's timestamp column.
    pub timestamp: DateTime<Utc>,
    pub error: Option<MessageError>,
}

/// Result of [`crate::entities::MessageStore::apply_status`].
#[derive(Debug, Clone)]
pub enum StatusOutcome {
    Applied(MessageRecord),
    /// The message already holds this status or a later one.
    Stale { current: MessageStatus },
    /// No message with that provider id exists for the tenant.
    UnknownMessage,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn forward_transitions_are_allowed() {
        use MessageStatus::*;
        assert!(Sent.predecessors().contains(&Pending));
        assert!(Delivered.predecessors().contains(&Sent));
        assert!(Read.predecessors().contains(&Sent));
        assert!(Read.predecessors().contains(&Delivered));
        assert!(Failed.predecessors().contains(&Pending));
        assert!(Failed.predecessors().contains(&Sent));
    }

    #[test]
    fn backward_and_terminal_transitions_are_refused() {
        use MessageStatus::*;
        assert!(!Delivered.predecessors().contains(&Read));
        assert!(!Delivered.predecessors().contains(&Delivered));
        assert!(!Failed.predecessors().contains(&Delivered));
        assert!(!Failed.predecessors().contains(&Read));
        assert!(!Read.predecessors().contains(&Failed));
        for next in [Pending, Sent, Delivered, Read, Failed] {
            assert!(!next.predecessors().contains(&Read));
            assert!(!next.predecessors().contains(&Failed));
        }
    }

    #[test]
    fn status_strings_match_provider_vocabulary() {
        assert_eq!(MessageStatus::Delivered.as_ref(), "delivered");
        assert_eq!("read".parse::<MessageStatus>().ok(), Some(MessageStatus::Read));
        assert!("deleted".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn text_content_serializes_with_text_field() {
        let content = MessageContent::Text { text: "Hi".into() };
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value, json!({ "kind": "text", "text": "Hi" }));
        assert_eq!(content.message_type(), MessageType::Text);
    }

    #[test]
    fn other_content_keeps_raw_payload() {
        let content = MessageContent::Other {
            provider_type: "unknown_future_type".into(),
            raw: json!({ "foo": 1 }),
        };
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["raw"], json!({ "foo": 1 }));
        let back: MessageContent = serde_json::from_value(value).unwrap();
        assert_eq!(back, content);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `object` value of WhatsApp Business Account webhooks.
pub const WABA_OBJECT: &str = "whatsapp_business_account";

/// Change field carrying messages and statuses.
pub const MESSAGES_FIELD: &str = "messages";

// ── Webhook payload ───────────────────────────────────────────────────────────

/// Top-level `POST /webhook` body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    /// WABA id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    /// Kept as JSON until `field` says what it is; non-message changes
    /// (account updates, template reviews) have unrelated shapes.
    #[serde(default)]
    pub value: Value,
}

/// `value` of a `messages` change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<WaContact>,
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<WaStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<WaProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaProfile {
    #[serde(default)]
    pub name: Option<String>,
}

/// One inbound message. The type-specific body sits under a key named after
/// `type` (e.g. `"text": {"body": …}`) and is kept in `bodies` so unknown
/// types survive verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct WaMessage {
    pub id: String,
    pub from: String,
    /// Unix seconds as a decimal string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub context: Option<WaContext>,
    #[serde(flatten)]
    pub bodies: Map<String, Value>,
}

impl WaMessage {
    /// The body keyed by this message's own type.
    pub fn body(&self) -> Option<&Value> {
        self.bodies.get(&self.kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContext {
    pub id: String,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaTextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaMediaBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaLocationBody {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaInteractiveBody {
    ButtonReply { button_reply: WaReplyOption },
    ListReply { list_reply: WaReplyOption },
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaReplyOption {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaReactionBody {
    pub message_id: String,
    #[serde(default)]
    pub emoji: Option<String>,
}

/// One delivery-status callback.
#[derive(Debug, Clone, Deserialize)]
pub struct WaStatus {
    /// Provider message id the status refers to.
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<WaError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaError {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl WaError {
    /// Codes arrive as numbers; other shapes are kept as text.
    pub fn code_string(&self) -> Option<String> {
        match &self.code {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn description(&self) -> Option<String> {
        self.message.clone().or_else(|| self.title.clone())
    }
}

// ── Webhook verification ─────────────────────────────────────────────────────

/// Query string of the `GET /webhook` handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode", alias = "mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", alias = "verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge", alias = "challenge", default)]
    pub challenge: Option<String>,
}

// ── Graph API ─────────────────────────────────────────────────────────────────

/// `POST /{phone_number_id}/messages` body for sends.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageBody<'a> {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: &'a str,
    #[serde(flatten)]
    pub payload: OutboundPayload<'a>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload<'a> {
    Text { text: TextPayload<'a> },
    Template { template: TemplatePayload<'a> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPayload<'a> {
    pub preview_url: bool,
    pub body: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplatePayload<'a> {
    pub name: &'a str,
    pub language: TemplateLanguage<'a>,
    #[serde(skip_serializing_if = "is_null")]
    pub components: &'a Value,
}

fn is_null(value: &&Value) -> bool {
    value.is_null()
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateLanguage<'a> {
    pub code: &'a str,
}

/// `POST /{phone_number_id}/messages` body for read receipts.
#[derive(Debug, Clone, Serialize)]
pub struct MarkReadBody<'a> {
    pub messaging_product: &'static str,
    pub status: &'static str,
    pub message_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub messages: Vec<SentMessageId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessageId {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

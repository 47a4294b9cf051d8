use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::entities::{MessageContent, MessageContext, MessageError, MessageRecord, fmt_ts};

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessageListQuery {
    /// Counterparty WhatsApp id; matches either direction.
    pub contact: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SendTextRequest {
    /// Recipient WhatsApp id or phone number.
    #[validate(length(min = 5, max = 32))]
    pub to: String,
    #[validate(length(min = 1, max = 4096))]
    pub text: String,
}

fn default_template_language() -> String {
    "en".to_owned()
}

/// Send an approved message template, e.g. to open a conversation outside the
/// customer service window.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SendTemplateRequest {
    #[validate(length(min = 5, max = 32))]
    pub to: String,
    /// Template name as approved in the WhatsApp Business account.
    #[validate(length(min = 1, max = 512))]
    pub name: String,
    #[serde(default = "default_template_language")]
    #[validate(length(min = 2, max = 15))]
    pub language: String,
    /// Graph API `components` array, passed through untouched.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub components: Option<Value>,
}

impl SendTemplateRequest {
    pub fn into_content(self) -> MessageContent {
        MessageContent::Template {
            name: self.name,
            language: self.language,
            components: self.components.unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageErrorResponse {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageContextResponse {
    pub message_id: String,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub tenant_id: String,
    pub wa_message_id: Option<String>,
    pub direction: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub from: String,
    pub to: String,
    /// Canonical content, tagged by `kind`.
    #[schema(value_type = Object)]
    pub content: Value,
    pub status: String,
    pub sent_at: Option<String>,
    pub delivered_at: Option<String>,
    pub read_at: Option<String>,
    pub failed_at: Option<String>,
    pub error: Option<MessageErrorResponse>,
    pub context: Option<MessageContextResponse>,
    /// Provider-side send time of inbound messages.
    pub timestamp: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessagePage {
    pub messages: Vec<MessageResponse>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl From<&MessageError> for MessageErrorResponse {
    fn from(e: &MessageError) -> Self {
        Self {
            code: e.code.clone(),
            message: e.message.clone(),
        }
    }
}

impl From<&MessageContext> for MessageContextResponse {
    fn from(c: &MessageContext) -> Self {
        Self {
            message_id: c.message_id.clone(),
            from: c.from.clone(),
        }
    }
}

impl MessageRecord {
    pub fn to_response(&self) -> MessageResponse {
        MessageResponse {
            id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
            wa_message_id: self.provider_message_id.clone(),
            direction: self.direction.to_string(),
            message_type: self.message_type.to_string(),
            from: self.from_number.clone(),
            to: self.to_number.clone(),
            content: serde_json::to_value(&self.content).unwrap_or(Value::Null),
            status: self.status.to_string(),
            sent_at: self.sent_at.map(fmt_ts),
            delivered_at: self.delivered_at.map(fmt_ts),
            read_at: self.read_at.map(fmt_ts),
            failed_at: self.failed_at.map(fmt_ts),
            error: self.error.as_ref().map(MessageErrorResponse::from),
            context: self.context.as_ref().map(MessageContextResponse::from),
            timestamp: self.provider_timestamp.map(fmt_ts),
            created_at: fmt_ts(self.created_at),
            updated_at: fmt_ts(self.updated_at),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn send_request_bounds() {
        let ok = SendTextRequest { to: "919876543210".into(), text: "Hi".into() };
        assert!(ok.validate().is_ok());
        let empty = SendTextRequest { to: "919876543210".into(), text: String::new() };
        assert!(empty.validate().is_err());
        let short = SendTextRequest { to: "12".into(), text: "Hi".into() };
        assert!(short.validate().is_err());
    }

    #[test]
    fn template_language_defaults_to_english() {
        let req: SendTemplateRequest =
            serde_json::from_value(serde_json::json!({ "to": "919876543210", "name": "hello_world" }))
                .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.into_content(), MessageContent::Template {
            name: "hello_world".into(),
            language: "en".into(),
            components: Value::Null,
        });
    }
}

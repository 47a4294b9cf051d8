//! Outbound provider calls: sending messages and read receipts.
//!
//! [`MessageSender`] is the seam the rest of the server talks to;
//! [`GraphApiClient`] is the production implementation over the WhatsApp
//! Cloud API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::entities::{MessageContent, MessageError, MessageType, TenantRecord};
use crate::models::whatsapp::{
    GraphErrorEnvelope, MarkReadBody, OutboundPayload, SendMessageBody, SendMessageResponse,
    TemplateLanguage, TemplatePayload, TextPayload,
};

/// Errors returned by a [`MessageSender`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The provider answered with an error body.
    #[error("provider error (code {code:?}): {message}")]
    Provider { code: Option<i64>, message: String },

    /// The request never produced a provider answer.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The tenant has no phone number id or no usable access token.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// Only text and template messages can be sent.
    #[error("cannot send {0} messages")]
    Unsupported(MessageType),

    /// A success status without a message id.
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl SendError {
    /// Error to store on the failed message row.
    pub fn to_message_error(&self) -> MessageError {
        match self {
            SendError::Provider { code, message } => MessageError {
                code: code.map(|c| c.to_string()),
                message: Some(message.clone()),
            },
            other => MessageError {
                code: None,
                message: Some(other.to_string()),
            },
        }
    }
}

/// Who the provider call is made as.
#[derive(Clone)]
pub struct Credentials {
    pub phone_number_id: String,
    pub access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// The tenant's own token wins over the server-wide default.
    pub fn for_tenant(
        tenant: &TenantRecord,
        default_token: Option<&str>,
    ) -> Result<Self, SendError> {
        let phone_number_id = tenant
            .phone_number_id
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                SendError::MissingCredentials(format!("tenant {} has no phone number id", tenant.id))
            })?;
        let access_token = tenant
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(default_token)
            .map(str::to_owned)
            .ok_or_else(|| {
                SendError::MissingCredentials(format!("tenant {} has no access token", tenant.id))
            })?;
        Ok(Self {
            phone_number_id,
            access_token,
        })
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync + fmt::Debug {
    /// Send `content` to `to`, returning the provider message id.
    async fn send(
        &self,
        creds: &Credentials,
        to: &str,
        content: &MessageContent,
    ) -> Result<String, SendError>;

    /// Tell the provider an inbound message has been read.
    async fn mark_as_read(
        &self,
        creds: &Credentials,
        provider_message_id: &str,
    ) -> Result<(), SendError>;
}

/// WhatsApp Cloud API client.
#[derive(Debug, Clone)]
pub struct GraphApiClient {
    client: Client,
    /// `{base}/{version}` without a trailing slash.
    api_root: String,
}

impl GraphApiClient {
    pub fn new(base: &str, version: &str) -> Self {
        let client = Client::builder()
            .user_agent(concat!("wahook-server/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_root: format!("{}/{}", base.trim_end_matches('/'), version.trim_matches('/')),
        }
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{}/messages", self.api_root, phone_number_id)
    }

    async fn post_messages<T: Serialize + Sync>(
        &self,
        creds: &Credentials,
        body: &T,
    ) -> Result<String, SendError> {
        let resp = self
            .client
            .post(self.messages_url(&creds.phone_number_id))
            .bearer_auth(&creds.access_token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status.is_success() {
            return Ok(text);
        }

        Err(match serde_json::from_str::<GraphErrorEnvelope>(&text) {
            Ok(envelope) => SendError::Provider {
                code: envelope.error.code,
                message: envelope
                    .error
                    .message
                    .unwrap_or_else(|| format!("HTTP {status}")),
            },
            Err(_) => SendError::Provider {
                code: None,
                message: format!("HTTP {status}: {}", truncate(&text, 200)),
            },
        })
    }
}

#[async_trait]
impl MessageSender for GraphApiClient {
    async fn send(
        &self,
        creds: &Credentials,
        to: &str,
        content: &MessageContent,
    ) -> Result<String, SendError> {
        let payload = outbound_payload(content)?;
        let body = SendMessageBody {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            payload,
        };

        let raw = self.post_messages(creds, &body).await?;
        let parsed: SendMessageResponse = serde_json::from_str(&raw)
            .map_err(|e| SendError::InvalidResponse(e.to_string()))?;
        let id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| SendError::InvalidResponse("no message id in response".into()))?;
        debug!(wamid = %id, to, "message accepted by provider");
        Ok(id)
    }

    async fn mark_as_read(
        &self,
        creds: &Credentials,
        provider_message_id: &str,
    ) -> Result<(), SendError> {
        let body = MarkReadBody {
            messaging_product: "whatsapp",
            status: "read",
            message_id: provider_message_id,
        };
        self.post_messages(creds, &body).await?;
        Ok(())
    }
}

/// Graph API body for `content`; only text and templates can be sent.
fn outbound_payload(content: &MessageContent) -> Result<OutboundPayload<'_>, SendError> {
    match content {
        MessageContent::Text { text } => Ok(OutboundPayload::Text {
            text: TextPayload {
                preview_url: false,
                body: text,
            },
        }),
        MessageContent::Template {
            name,
            language,
            components,
        } => Ok(OutboundPayload::Template {
            template: TemplatePayload {
                name,
                language: TemplateLanguage { code: language },
                components,
            },
        }),
        other => Err(SendError::Unsupported(other.message_type())),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}


// ── Tests ──────────────────────────────────────────────────────────────────────

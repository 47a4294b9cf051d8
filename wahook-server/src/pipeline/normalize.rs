//! Provider message → canonical [`MessageContent`].
//!
//! Bodies that fail to parse, unknown interactive sub-types and unknown
//! message types are all kept as [`MessageContent::Other`] with the raw JSON,
//! never dropped. Media ids and URLs are passed through unchecked.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::EnumString;
use tracing::{debug, warn};

use crate::entities::dao::message::{InteractiveReply, LocationContent, MediaContent};
use crate::entities::{MessageContent, MessageContext, NormalizedMessage};
use crate::models::whatsapp::{
    WaInteractiveBody, WaLocationBody, WaMediaBody, WaMessage, WaReactionBody, WaTextBody,
};

/// Message types this service understands; anything else is `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
enum ProviderKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Interactive,
    Reaction,
    #[strum(default)]
    Unknown(String),
}

pub fn normalize(message: &WaMessage, received_at: DateTime<Utc>) -> NormalizedMessage {
    NormalizedMessage {
        provider_message_id: message.id.clone(),
        from: canonical_wa_id(&message.from),
        content: normalize_content(message),
        timestamp: provider_timestamp(message.timestamp.as_deref(), received_at),
        context: message.context.as_ref().map(|ctx| MessageContext {
            message_id: ctx.id.clone(),
            from: ctx.from.as_deref().map(canonical_wa_id),
        }),
    }
}

pub fn normalize_content(message: &WaMessage) -> MessageContent {
    let body = message.body();
    // `from_str` never fails thanks to the `Unknown` default.
    let kind = message
        .kind
        .parse::<ProviderKind>()
        .unwrap_or_else(|_| ProviderKind::Unknown(message.kind.clone()));

    let parsed = match kind {
        ProviderKind::Text => {
            parse::<WaTextBody>(message, body).map(|b| MessageContent::Text { text: b.body })
        }
        ProviderKind::Image => parse(message, body).map(|b| MessageContent::Image(media(b))),
        ProviderKind::Video => parse(message, body).map(|b| MessageContent::Video(media(b))),
        ProviderKind::Audio => parse(message, body).map(|b| MessageContent::Audio(media(b))),
        ProviderKind::Document => parse(message, body).map(|b| MessageContent::Document(media(b))),
        ProviderKind::Sticker => parse(message, body).map(|b| MessageContent::Sticker(media(b))),
        ProviderKind::Location => parse::<WaLocationBody>(message, body).map(|b| {
            MessageContent::Location(LocationContent {
                latitude: b.latitude,
                longitude: b.longitude,
                name: b.name,
                address: b.address,
            })
        }),
        ProviderKind::Interactive => {
            parse::<WaInteractiveBody>(message, body).map(|b| MessageContent::Interactive {
                reply: match b {
                    WaInteractiveBody::ButtonReply { button_reply } => InteractiveReply::ButtonReply {
                        button_id: button_reply.id,
                        button_title: button_reply.title,
                    },
                    WaInteractiveBody::ListReply { list_reply } => InteractiveReply::ListReply {
                        list_id: list_reply.id,
                        list_title: list_reply.title,
                        list_description: list_reply.description,
                    },
                },
            })
        }
        ProviderKind::Reaction => parse::<WaReactionBody>(message, body).map(|b| {
            MessageContent::Reaction {
                message_id: b.message_id,
                emoji: b.emoji.filter(|e| !e.is_empty()),
            }
        }),
        ProviderKind::Unknown(kind) => {
            debug!(wamid = %message.id, kind = %kind, "unsupported message type; keeping raw payload");
            None
        }
    };

    parsed.unwrap_or_else(|| raw(message))
}

/// WhatsApp ids are digits only; strip `+`, spaces and punctuation.
pub fn canonical_wa_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() { raw.trim().to_owned() } else { digits }
}

/// Parse the provider's unix-seconds timestamp, falling back to receipt time.
pub fn provider_timestamp(raw: Option<&str>, received_at: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return received_at;
    };
    let parsed = raw
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        // Stored timestamps must keep a 4-digit year to sort as text.
        .filter(|ts| (0..=9999).contains(&ts.year()));
    match parsed {
        Some(ts) => ts,
        None => {
            warn!(raw = %raw, "unparseable or out-of-range provider timestamp; using receipt time");
            received_at
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse<T: DeserializeOwned>(message: &WaMessage, body: Option<&Value>) -> Option<T> {
    let body = body?;
    match serde_json::from_value(body.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(wamid = %message.id, kind = %message.kind, error = %e, "malformed message body; keeping raw payload");
            None
        }
    }
}

fn media(body: WaMediaBody) -> MediaContent {
    MediaContent {
        media_id: body.id,
        mime_type: body.mime_type,
        caption: body.caption,
        file_name: body.filename,
        sha256: body.sha256,
    }
}

/// The type-keyed body when present, otherwise every unrecognised field.
fn raw(message: &WaMessage) -> MessageContent {
    let raw = match message.body() {
        Some(body) => body.clone(),
        None => Value::Object(message.bodies.clone()),
    };
    MessageContent::Other {
        provider_type: message.kind.clone(),
        raw,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Provider wire types.
//!
//! These mirror the JSON shapes exchanged with the WhatsApp Cloud API: the
//! webhook payload it posts to us and the Graph API request/response bodies
//! we send. They are deliberately lenient (`Option` + `#[serde(default)]`)
//! because the provider adds fields without notice.

pub mod whatsapp;

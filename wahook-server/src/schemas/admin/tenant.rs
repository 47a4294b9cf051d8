use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::{NewTenant, TenantRecord, fmt_ts};

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Provider phone-number id that webhooks are routed by.
    #[validate(length(min = 1, max = 64))]
    pub phone_number_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub waba_id: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub display_phone_number: Option<String>,
    /// Graph API token; the server default is used when absent.
    pub access_token: Option<String>,
    #[validate(range(min = 0))]
    pub message_credits: Option<i64>,
    pub auto_reply_enabled: Option<bool>,
    #[validate(length(max = 4096))]
    pub auto_reply_message: Option<String>,
}

impl CreateTenantRequest {
    pub fn into_new_tenant(self) -> NewTenant {
        let defaults = NewTenant::default();
        NewTenant {
            name: self.name.trim().to_owned(),
            phone_number_id: self.phone_number_id.map(|p| p.trim().to_owned()),
            waba_id: self.waba_id,
            display_phone_number: self.display_phone_number,
            access_token: self.access_token.filter(|t| !t.trim().is_empty()),
            message_credits: self.message_credits.unwrap_or(defaults.message_credits),
            auto_reply_enabled: self.auto_reply_enabled.unwrap_or(false),
            auto_reply_message: self.auto_reply_message,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct AutoReplyRequest {
    pub enabled: bool,
    /// Omit to keep the current text.
    #[validate(length(max = 4096))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// Tenant as exposed by the admin API. The access token is never returned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantResponse {
    pub id: String,
    pub name: String,
    pub phone_number_id: Option<String>,
    pub waba_id: Option<String>,
    pub display_phone_number: Option<String>,
    pub has_access_token: bool,
    pub message_credits: i64,
    pub total_messages_sent: i64,
    pub auto_reply_enabled: bool,
    pub auto_reply_message: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TenantRecord {
    pub fn to_response(&self) -> TenantResponse {
        TenantResponse {
            id: self.id.clone(),
            name: self.name.clone(),
            phone_number_id: self.phone_number_id.clone(),
            waba_id: self.waba_id.clone(),
            display_phone_number: self.display_phone_number.clone(),
            has_access_token: self.access_token.is_some(),
            message_credits: self.message_credits,
            total_messages_sent: self.total_messages_sent,
            auto_reply_enabled: self.auto_reply_enabled,
            auto_reply_message: self.auto_reply_message.clone(),
            is_active: self.is_active,
            created_at: fmt_ts(self.created_at),
            updated_at: fmt_ts(self.updated_at),
        }
    }
}

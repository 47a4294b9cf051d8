use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::{ContactRecord, fmt_ts};

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateContactRequest {
    #[validate(length(min = 5, max = 32))]
    pub wa_id: String,
    #[validate(length(max = 200))]
    pub name: Option<String>,
    /// Where consent was collected; defaults to `manual`.
    #[validate(length(max = 64))]
    pub opt_in_source: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetBlockedRequest {
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactResponse {
    pub id: String,
    pub wa_id: String,
    pub name: Option<String>,
    pub profile_name: Option<String>,
    pub display_name: Option<String>,
    pub phone: String,
    pub total_messages: i64,
    pub first_message_at: Option<String>,
    pub last_message_at: Option<String>,
    pub opt_in: bool,
    pub opt_in_at: Option<String>,
    pub opt_in_source: Option<String>,
    pub is_blocked: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ContactRecord {
    pub fn to_response(&self) -> ContactResponse {
        ContactResponse {
            id: self.id.clone(),
            wa_id: self.wa_id.clone(),
            name: self.name.clone(),
            profile_name: self.profile_name.clone(),
            display_name: self.display_name().map(str::to_owned),
            phone: self.phone.clone(),
            total_messages: self.total_messages,
            first_message_at: self.first_message_at.map(fmt_ts),
            last_message_at: self.last_message_at.map(fmt_ts),
            opt_in: self.opt_in,
            opt_in_at: self.opt_in_at.map(fmt_ts),
            opt_in_source: self.opt_in_source.clone(),
            is_blocked: self.is_blocked,
            created_at: fmt_ts(self.created_at),
            updated_at: fmt_ts(self.updated_at),
        }
    }
}

use chrono::{DateTime, Utc};

/// A row in the `tenants` table.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub id: String,
    pub name: String,
    /// Provider phone-number identifier; webhook routing key.
    pub phone_number_id: Option<String>,
    /// WhatsApp Business Account the phone number belongs to.
    pub waba_id: Option<String>,
    pub display_phone_number: Option<String>,
    /// Graph API token for this tenant; `None` uses the server default.
    pub access_token: Option<String>,
    pub message_credits: i64,
    pub total_messages_sent: i64,
    pub auto_reply_enabled: bool,
    pub auto_reply_message: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when registering a tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub phone_number_id: Option<String>,
    pub waba_id: Option<String>,
    pub display_phone_number: Option<String>,
    pub access_token: Option<String>,
    pub message_credits: i64,
    pub auto_reply_enabled: bool,
    pub auto_reply_message: Option<String>,
}

impl Default for NewTenant {
    fn default() -> Self {
        Self {
            name: String::new(),
            phone_number_id: None,
            waba_id: None,
            display_phone_number: None,
            access_token: None,
            message_credits: 100,
            auto_reply_enabled: false,
            auto_reply_message: None,
        }
    }
}

impl TenantRecord {
    pub fn from_new(id: String, new: NewTenant, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            phone_number_id: new.phone_number_id,
            waba_id: new.waba_id,
            display_phone_number: new.display_phone_number,
            access_token: new.access_token,
            message_credits: new.message_credits,
            total_messages_sent: 0,
            auto_reply_enabled: new.auto_reply_enabled,
            auto_reply_message: new.auto_reply_message,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Real-time channel key for this tenant.
    pub fn channel(&self) -> String {
        channel_for(&self.id)
    }

    /// The auto-reply text, when auto-reply is switched on and non-blank.
    pub fn auto_reply_text(&self) -> Option<&str> {
        if !self.auto_reply_enabled {
            return None;
        }
        self.auto_reply_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Number this tenant sends from, as stored on outbound rows.
    pub fn sender_number(&self) -> String {
        self.display_phone_number
            .clone()
            .or_else(|| self.phone_number_id.clone())
            .unwrap_or_default()
    }
}

pub fn channel_for(tenant_id: &str) -> String {
    format!("tenant-{tenant_id}")
}

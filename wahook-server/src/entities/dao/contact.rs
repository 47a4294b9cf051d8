use chrono::{DateTime, Utc};

/// A row in the `contacts` table, unique per `(tenant_id, wa_id)`.
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub id: String,
    pub tenant_id: String,
    pub wa_id: String,
    /// Tenant-entered name, or the first profile name seen on insert.
    pub name: Option<String>,
    /// Latest profile name reported by the provider.
    pub profile_name: Option<String>,
    pub phone: String,
    pub total_messages: i64,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub opt_in: bool,
    pub opt_in_at: Option<DateTime<Utc>>,
    pub opt_in_source: Option<String>,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactRecord {
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.profile_name.as_deref())
    }
}

/// A contact created explicitly by the tenant.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub wa_id: String,
    pub name: Option<String>,
    pub opt_in_source: Option<String>,
}

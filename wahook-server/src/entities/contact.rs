use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::{ContactRecord, NewContact, SqliteStore, fmt_ts, parse_opt_ts, parse_ts};

pub trait ContactStore: Send + Sync + 'static {
    /// Create a contact from tenant input, or rename an existing one.
    fn create_contact(
        &self,
        tenant_id: &str,
        contact: &NewContact,
    ) -> impl Future<Output = Result<ContactRecord, sqlx::Error>> + Send;

    fn set_blocked(
        &self,
        tenant_id: &str,
        wa_id: &str,
        blocked: bool,
    ) -> impl Future<Output = Result<Option<ContactRecord>, sqlx::Error>> + Send;

    fn get_contact(
        &self,
        tenant_id: &str,
        wa_id: &str,
    ) -> impl Future<Output = Result<Option<ContactRecord>, sqlx::Error>> + Send;

    /// Most recently active first.
    fn list_contacts(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<ContactRecord>, sqlx::Error>> + Send;
}

const CONTACT_COLUMNS: &str = "id, tenant_id, wa_id, name, profile_name, phone, total_messages, \
     first_message_at, last_message_at, opt_in, opt_in_at, opt_in_source, is_blocked, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: String,
    tenant_id: String,
    wa_id: String,
    name: Option<String>,
    profile_name: Option<String>,
    phone: String,
    total_messages: i64,
    first_message_at: Option<String>,
    last_message_at: Option<String>,
    opt_in: bool,
    opt_in_at: Option<String>,
    opt_in_source: Option<String>,
    is_blocked: bool,
    created_at: String,
    updated_at: String,
}

impl From<ContactRow> for ContactRecord {
    fn from(row: ContactRow) -> Self {
        ContactRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            wa_id: row.wa_id,
            name: row.name,
            profile_name: row.profile_name,
            phone: row.phone,
            total_messages: row.total_messages,
            first_message_at: parse_opt_ts(row.first_message_at, "contacts.first_message_at"),
            last_message_at: parse_opt_ts(row.last_message_at, "contacts.last_message_at"),
            opt_in: row.opt_in,
            opt_in_at: parse_opt_ts(row.opt_in_at, "contacts.opt_in_at"),
            opt_in_source: row.opt_in_source,
            is_blocked: row.is_blocked,
            created_at: parse_ts(&row.created_at, "contacts.created_at"),
            updated_at: parse_ts(&row.updated_at, "contacts.updated_at"),
        }
    }
}

/// Count one inbound message from `wa_id`, creating the contact on first
/// contact. A single upsert: concurrent touches never lose an increment.
///
/// Takes any executor so [`crate::entities::MessageStore::record_inbound`]
/// can run it in the same transaction as the message insert.
pub(crate) async fn touch<'e, E>(
    exec: E,
    tenant_id: &str,
    wa_id: &str,
    profile_name_hint: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ContactRecord, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let hint = profile_name_hint.map(str::trim).filter(|n| !n.is_empty());
    let row: ContactRow = sqlx::query_as(&format!(
        "INSERT INTO contacts (id, tenant_id, wa_id, name, profile_name, phone, \
         total_messages, first_message_at, last_message_at, opt_in, opt_in_at, \
         opt_in_source, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4, ?3, 1, ?5, ?5, 1, ?5, 'inbound_message', ?6, ?6) \
         ON CONFLICT(tenant_id, wa_id) DO UPDATE SET \
           total_messages = contacts.total_messages + 1, \
           last_message_at = CASE \
             WHEN contacts.last_message_at IS NULL \
               OR contacts.last_message_at < excluded.last_message_at \
             THEN excluded.last_message_at ELSE contacts.last_message_at END, \
           first_message_at = CASE \
             WHEN contacts.first_message_at IS NULL \
               OR contacts.first_message_at > excluded.first_message_at \
             THEN excluded.first_message_at ELSE contacts.first_message_at END, \
           profile_name = COALESCE(excluded.profile_name, contacts.profile_name), \
           name = COALESCE(NULLIF(TRIM(contacts.name), ''), excluded.name), \
           updated_at = excluded.updated_at \
         RETURNING {CONTACT_COLUMNS}"
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id)
    .bind(wa_id)
    .bind(hint)
    .bind(fmt_ts(at))
    .bind(fmt_ts(Utc::now()))
    .fetch_one(exec)
    .await?;
    Ok(row.into())
}

impl ContactStore for SqliteStore {
    async fn create_contact(
        &self,
        tenant_id: &str,
        contact: &NewContact,
    ) -> Result<ContactRecord, sqlx::Error> {
        let now = fmt_ts(Utc::now());
        let row: ContactRow = sqlx::query_as(&format!(
            "INSERT INTO contacts (id, tenant_id, wa_id, name, phone, total_messages, opt_in, \
             opt_in_at, opt_in_source, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?3, 0, 1, ?5, COALESCE(?6, 'manual'), ?5, ?5) \
             ON CONFLICT(tenant_id, wa_id) DO UPDATE SET \
               name = COALESCE(excluded.name, contacts.name), \
               updated_at = excluded.updated_at \
             RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id)
        .bind(&contact.wa_id)
        .bind(contact.name.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .bind(&now)
        .bind(&contact.opt_in_source)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn set_blocked(
        &self,
        tenant_id: &str,
        wa_id: &str,
        blocked: bool,
    ) -> Result<Option<ContactRecord>, sqlx::Error> {
        let row: Option<ContactRow> = sqlx::query_as(&format!(
            "UPDATE contacts SET is_blocked = ?1, updated_at = ?2 \
             WHERE tenant_id = ?3 AND wa_id = ?4 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(blocked)
        .bind(fmt_ts(Utc::now()))
        .bind(tenant_id)
        .bind(wa_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ContactRecord::from))
    }

    async fn get_contact(
        &self,
        tenant_id: &str,
        wa_id: &str,
    ) -> Result<Option<ContactRecord>, sqlx::Error> {
        let row: Option<ContactRow> = sqlx::query_as(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 AND wa_id = ?2"
        ))
        .bind(tenant_id)
        .bind(wa_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ContactRecord::from))
    }

    async fn list_contacts(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContactRecord>, sqlx::Error> {
        let rows: Vec<ContactRow> = sqlx::query_as(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 \
             ORDER BY last_message_at IS NULL, last_message_at DESC, created_at DESC \
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ContactRecord::from).collect())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

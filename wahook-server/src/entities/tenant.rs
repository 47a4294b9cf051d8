use crate::entities::{SqliteStore, TenantRecord, fmt_ts, parse_ts};
use chrono::Utc;
use std::future::Future;

pub trait TenantStore: Send + Sync + 'static {
    fn insert_tenant(
        &self,
        record: TenantRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_tenant(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TenantRecord>, sqlx::Error>> + Send;
    /// Exact match on the routing key; never falls back to another tenant.
    fn find_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> impl Future<Output = Result<Option<TenantRecord>, sqlx::Error>> + Send;
    fn list_tenants(&self) -> impl Future<Output = Result<Vec<TenantRecord>, sqlx::Error>> + Send;
    fn set_auto_reply(
        &self,
        id: &str,
        enabled: bool,
        message: Option<&str>,
    ) -> impl Future<Output = Result<Option<TenantRecord>, sqlx::Error>> + Send;
    fn set_active(
        &self,
        id: &str,
        active: bool,
    ) -> impl Future<Output = Result<Option<TenantRecord>, sqlx::Error>> + Send;
    /// Take one message credit. Returns `false` when none are left.
    fn debit_credit(&self, id: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Give back a credit taken for a send the provider rejected.
    fn refund_credit(&self, id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

const TENANT_COLUMNS: &str = "id, name, phone_number_id, waba_id, display_phone_number, \
     access_token, message_credits, total_messages_sent, auto_reply_enabled, \
     auto_reply_message, is_active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    name: String,
    phone_number_id: Option<String>,
    waba_id: Option<String>,
    display_phone_number: Option<String>,
    access_token: Option<String>,
    message_credits: i64,
    total_messages_sent: i64,
    auto_reply_enabled: bool,
    auto_reply_message: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl From<TenantRow> for TenantRecord {
    fn from(row: TenantRow) -> Self {
        TenantRecord {
            id: row.id,
            name: row.name,
            phone_number_id: row.phone_number_id,
            waba_id: row.waba_id,
            display_phone_number: row.display_phone_number,
            access_token: row.access_token,
            message_credits: row.message_credits,
            total_messages_sent: row.total_messages_sent,
            auto_reply_enabled: row.auto_reply_enabled,
            auto_reply_message: row.auto_reply_message,
            is_active: row.is_active,
            created_at: parse_ts(&row.created_at, "tenants.created_at"),
            updated_at: parse_ts(&row.updated_at, "tenants.updated_at"),
        }
    }
}

impl TenantStore for SqliteStore {
    async fn insert_tenant(&self, record: TenantRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tenants (id, name, phone_number_id, waba_id, display_phone_number, \
             access_token, message_credits, total_messages_sent, auto_reply_enabled, \
             auto_reply_message, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.phone_number_id)
        .bind(&record.waba_id)
        .bind(&record.display_phone_number)
        .bind(&record.access_token)
        .bind(record.message_credits)
        .bind(record.total_messages_sent)
        .bind(record.auto_reply_enabled)
        .bind(&record.auto_reply_message)
        .bind(record.is_active)
        .bind(fmt_ts(record.created_at))
        .bind(fmt_ts(record.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_tenant(&self, id: &str) -> Result<Option<TenantRecord>, sqlx::Error> {
        let row: Option<TenantRow> =
            sqlx::query_as(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(TenantRecord::from))
    }

    async fn find_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<TenantRecord>, sqlx::Error> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE phone_number_id = ?1"
        ))
        .bind(phone_number_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TenantRecord::from))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantRecord>, sqlx::Error> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TenantRecord::from).collect())
    }

    async fn set_auto_reply(
        &self,
        id: &str,
        enabled: bool,
        message: Option<&str>,
    ) -> Result<Option<TenantRecord>, sqlx::Error> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "UPDATE tenants SET auto_reply_enabled = ?1, \
             auto_reply_message = COALESCE(?2, auto_reply_message), updated_at = ?3 \
             WHERE id = ?4 RETURNING {TENANT_COLUMNS}"
        ))
        .bind(enabled)
        .bind(message)
        .bind(fmt_ts(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TenantRecord::from))
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<Option<TenantRecord>, sqlx::Error> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "UPDATE tenants SET is_active = ?1, updated_at = ?2 \
             WHERE id = ?3 RETURNING {TENANT_COLUMNS}"
        ))
        .bind(active)
        .bind(fmt_ts(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TenantRecord::from))
    }

    async fn debit_credit(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tenants SET message_credits = message_credits - 1, \
             total_messages_sent = total_messages_sent + 1, updated_at = ?1 \
             WHERE id = ?2 AND message_credits > 0",
        )
        .bind(fmt_ts(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn refund_credit(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tenants SET message_credits = message_credits + 1, \
             total_messages_sent = MAX(total_messages_sent - 1, 0), updated_at = ?1 \
             WHERE id = ?2",
        )
        .bind(fmt_ts(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::testing;

    #[tokio::test]
    async fn lookup_by_phone_number_id_is_exact() {
        let store = testing::store().await;
        let acme = testing::tenant(&store, "1111").await;
        testing::tenant(&store, "2222").await;

        let found = store.find_by_phone_number_id("1111").await.unwrap().unwrap();
        assert_eq!(found.id, acme.id);
        assert!(store.find_by_phone_number_id("3333").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn debit_stops_at_zero() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        for _ in 0..tenant.message_credits {
            assert!(store.debit_credit(&tenant.id).await.unwrap());
        }
        assert!(!store.debit_credit(&tenant.id).await.unwrap());

        store.refund_credit(&tenant.id).await.unwrap();
        let after = store.get_tenant(&tenant.id).await.unwrap().unwrap();
        assert_eq!(after.message_credits, 1);
        assert_eq!(after.total_messages_sent, tenant.message_credits - 1);
    }

    #[tokio::test]
    async fn auto_reply_settings_update_in_place() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        let updated = store
            .set_auto_reply(&tenant.id, true, Some("We'll be right back"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.auto_reply_text(), Some("We'll be right back"));

        let disabled = store.set_auto_reply(&tenant.id, false, None).await.unwrap().unwrap();
        assert_eq!(disabled.auto_reply_message.as_deref(), Some("We'll be right back"));
        assert_eq!(disabled.auto_reply_text(), None);
    }
}

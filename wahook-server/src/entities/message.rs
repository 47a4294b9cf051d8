//! Idempotent message store and status reconciliation.
//!
//! Inbound rows are inserted with `ON CONFLICT(tenant_id,
//! provider_message_id) DO NOTHING`, so concurrent redeliveries of the same
//! provider message converge to one row. Status callbacks are applied with a
//! conditional `UPDATE … WHERE status IN (predecessors)`: the database, not
//! application memory, decides whether an event is newer than what is stored.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::entities::contact::touch;
use crate::entities::{
    Direction, InsertOutcome, MessageContent, MessageContext, MessageError, MessageRecord,
    MessageStatus, MessageType, NormalizedMessage, SqliteStore, StatusOutcome, StatusUpdate,
    fmt_ts, parse_opt_ts, parse_ts,
};

pub trait MessageStore: Send + Sync + 'static {
    /// Store an inbound message once per `(tenant_id, provider_message_id)`
    /// and count it on the sender's contact.
    ///
    /// Both writes share one transaction: when the contact upsert fails the
    /// message is rolled back too, so a redelivery stores and counts it again.
    fn record_inbound(
        &self,
        tenant_id: &str,
        to_number: &str,
        message: &NormalizedMessage,
        profile_name_hint: Option<&str>,
    ) -> impl Future<Output = Result<InsertOutcome, sqlx::Error>> + Send;

    /// Create an outbound row in `pending`, before the provider has seen it.
    fn create_outbound(
        &self,
        tenant_id: &str,
        from_number: &str,
        to_number: &str,
        content: &MessageContent,
    ) -> impl Future<Output = Result<MessageRecord, sqlx::Error>> + Send;

    /// Attach the provider id to an outbound row and move it to `sent`.
    ///
    /// Repeating the call with the same id is a no-op. Returns `None` when the
    /// local row does not exist or already carries a different provider id.
    fn record_outbound_sent(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
        local_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<MessageRecord>, sqlx::Error>> + Send;

    /// Mark a still-`pending` outbound row as failed. Returns `false` when the
    /// row had already left `pending`.
    fn fail_outbound(
        &self,
        local_message_id: &str,
        error: &MessageError,
        failed_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Apply a delivery-status event by status rank.
    fn apply_status(
        &self,
        tenant_id: &str,
        update: &StatusUpdate,
    ) -> impl Future<Output = Result<StatusOutcome, sqlx::Error>> + Send;

    fn get_message(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<MessageRecord>, sqlx::Error>> + Send;

    fn find_by_provider_id(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
    ) -> impl Future<Output = Result<Option<MessageRecord>, sqlx::Error>> + Send;

    /// Newest first. `contact` matches either side of the conversation.
    fn list_messages(
        &self,
        tenant_id: &str,
        contact: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, sqlx::Error>> + Send;

    fn count_messages(
        &self,
        tenant_id: &str,
        contact: Option<&str>,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

const MESSAGE_COLUMNS: &str = "id, tenant_id, provider_message_id, direction, msg_type, \
     from_number, to_number, content, status, sent_at, delivered_at, read_at, failed_at, \
     error_code, error_message, context_message_id, context_from, provider_timestamp, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    tenant_id: String,
    provider_message_id: Option<String>,
    direction: String,
    msg_type: String,
    from_number: String,
    to_number: String,
    content: String,
    status: String,
    sent_at: Option<String>,
    delivered_at: Option<String>,
    read_at: Option<String>,
    failed_at: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    context_message_id: Option<String>,
    context_from: Option<String>,
    provider_timestamp: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        let message_type = row.msg_type.parse().unwrap_or_else(|_| {
            warn!(id = %row.id, raw = %row.msg_type, "unknown stored message type; using other");
            MessageType::Other
        });
        let content = serde_json::from_str(&row.content).unwrap_or_else(|e| {
            warn!(id = %row.id, error = %e, "stored content is not valid JSON; keeping it raw");
            MessageContent::Other {
                provider_type: row.msg_type.clone(),
                raw: serde_json::Value::String(row.content.clone()),
            }
        });
        let direction = row.direction.parse().unwrap_or_else(|_| {
            warn!(id = %row.id, raw = %row.direction, "unknown stored direction; using inbound");
            Direction::Inbound
        });
        let status = row.status.parse().unwrap_or_else(|_| {
            warn!(id = %row.id, raw = %row.status, "unknown stored status; using pending");
            MessageStatus::Pending
        });
        let error = (row.error_code.is_some() || row.error_message.is_some()).then(|| MessageError {
            code: row.error_code,
            message: row.error_message,
        });
        let context = row.context_message_id.map(|message_id| MessageContext {
            message_id,
            from: row.context_from,
        });

        MessageRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            provider_message_id: row.provider_message_id,
            direction,
            message_type,
            from_number: row.from_number,
            to_number: row.to_number,
            content,
            status,
            sent_at: parse_opt_ts(row.sent_at, "messages.sent_at"),
            delivered_at: parse_opt_ts(row.delivered_at, "messages.delivered_at"),
            read_at: parse_opt_ts(row.read_at, "messages.read_at"),
            failed_at: parse_opt_ts(row.failed_at, "messages.failed_at"),
            error,
            context,
            provider_timestamp: parse_opt_ts(row.provider_timestamp, "messages.provider_timestamp"),
            created_at: parse_ts(&row.created_at, "messages.created_at"),
            updated_at: parse_ts(&row.updated_at, "messages.updated_at"),
        }
    }
}

fn content_json(content: &MessageContent) -> Result<String, sqlx::Error> {
    serde_json::to_string(content).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// `'a', 'b'` list for an `IN (…)` clause. Only ever built from enum names.
fn status_list(statuses: &[MessageStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MessageStore for SqliteStore {
    async fn record_inbound(
        &self,
        tenant_id: &str,
        to_number: &str,
        message: &NormalizedMessage,
        profile_name_hint: Option<&str>,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = fmt_ts(Utc::now());
        let delivered_at = fmt_ts(message.timestamp);
        let content = content_json(&message.content)?;
        let (context_id, context_from) = match &message.context {
            Some(ctx) => (Some(ctx.message_id.as_str()), ctx.from.as_deref()),
            None => (None, None),
        };

        let mut tx = self.pool.begin().await?;
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "INSERT INTO messages (id, tenant_id, provider_message_id, direction, msg_type, \
             from_number, to_number, content, status, delivered_at, context_message_id, \
             context_from, provider_timestamp, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 'inbound', ?4, ?5, ?6, ?7, 'delivered', ?8, ?9, ?10, ?8, ?11, ?11) \
             ON CONFLICT(tenant_id, provider_message_id) DO NOTHING \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(&id)
        .bind(tenant_id)
        .bind(&message.provider_message_id)
        .bind(message.content.message_type().as_ref())
        .bind(&message.from)
        .bind(to_number)
        .bind(&content)
        .bind(&delivered_at)
        .bind(context_id)
        .bind(context_from)
        .bind(&now)
        .fetch_optional(&mut *tx)
        .await?;

        // Dropping the transaction rolls back on every early return.
        let Some(row) = row else {
            return Ok(InsertOutcome::Duplicate);
        };
        let contact = touch(
            &mut *tx,
            tenant_id,
            &message.from,
            profile_name_hint,
            message.timestamp,
        )
        .await?;
        tx.commit().await?;

        Ok(InsertOutcome::Created {
            message: row.into(),
            contact,
        })
    }

    async fn create_outbound(
        &self,
        tenant_id: &str,
        from_number: &str,
        to_number: &str,
        content: &MessageContent,
    ) -> Result<MessageRecord, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = fmt_ts(Utc::now());
        let row: MessageRow = sqlx::query_as(&format!(
            "INSERT INTO messages (id, tenant_id, direction, msg_type, from_number, to_number, \
             content, status, created_at, updated_at) \
             VALUES (?1, ?2, 'outbound', ?3, ?4, ?5, ?6, 'pending', ?7, ?7) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(&id)
        .bind(tenant_id)
        .bind(content.message_type().as_ref())
        .bind(from_number)
        .bind(to_number)
        .bind(content_json(content)?)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn record_outbound_sent(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
        local_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<MessageRecord>, sqlx::Error> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "UPDATE messages SET provider_message_id = ?1, \
             status = CASE WHEN status = 'pending' THEN 'sent' ELSE status END, \
             sent_at = COALESCE(sent_at, ?2), updated_at = ?3 \
             WHERE id = ?4 AND tenant_id = ?5 AND direction = 'outbound' \
             AND (provider_message_id IS NULL OR provider_message_id = ?1) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(provider_message_id)
        .bind(fmt_ts(sent_at))
        .bind(fmt_ts(Utc::now()))
        .bind(local_message_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MessageRecord::from))
    }

    async fn fail_outbound(
        &self,
        local_message_id: &str,
        error: &MessageError,
        failed_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE messages SET status = 'failed', failed_at = ?1, error_code = ?2, \
             error_message = ?3, updated_at = ?4 \
             WHERE id = ?5 AND status = 'pending'",
        )
        .bind(fmt_ts(failed_at))
        .bind(&error.code)
        .bind(&error.message)
        .bind(fmt_ts(Utc::now()))
        .bind(local_message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_status(
        &self,
        tenant_id: &str,
        update: &StatusUpdate,
    ) -> Result<StatusOutcome, sqlx::Error> {
        let Some(column) = update.status.timestamp_column() else {
            // Nothing precedes `pending`; the event can only be stale.
            return self.classify_unapplied(tenant_id, &update.provider_message_id).await;
        };
        let predecessors = update.status.predecessors();

        let error_set = if update.status == MessageStatus::Failed {
            ", error_code = ?5, error_message = ?6"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE messages SET status = ?1, {column} = ?2, updated_at = ?3{error_set} \
             WHERE tenant_id = ?4 AND provider_message_id = ?7 AND status IN ({}) \
             RETURNING {MESSAGE_COLUMNS}",
            status_list(predecessors),
        );
        let (code, message) = match &update.error {
            Some(e) => (e.code.as_deref(), e.message.as_deref()),
            None => (None, None),
        };

        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(update.status.as_ref())
            .bind(fmt_ts(update.timestamp))
            .bind(fmt_ts(Utc::now()))
            .bind(tenant_id)
            .bind(code)
            .bind(message)
            .bind(&update.provider_message_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(StatusOutcome::Applied(row.into())),
            None => self.classify_unapplied(tenant_id, &update.provider_message_id).await,
        }
    }

    async fn get_message(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<MessageRecord>, sqlx::Error> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE tenant_id = ?1 AND id = ?2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MessageRecord::from))
    }

    async fn find_by_provider_id(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<MessageRecord>, sqlx::Error> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE tenant_id = ?1 AND provider_message_id = ?2"
        ))
        .bind(tenant_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MessageRecord::from))
    }

    async fn list_messages(
        &self,
        tenant_id: &str,
        contact: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRecord>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE tenant_id = ?1 AND (?2 IS NULL OR from_number = ?2 OR to_number = ?2) \
             ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(tenant_id)
        .bind(contact)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MessageRecord::from).collect())
    }

    async fn count_messages(&self, tenant_id: &str, contact: Option<&str>) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages \
             WHERE tenant_id = ?1 AND (?2 IS NULL OR from_number = ?2 OR to_number = ?2)",
        )
        .bind(tenant_id)
        .bind(contact)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

impl SqliteStore {
    /// Explain why a status event changed nothing.
    async fn classify_unapplied(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
    ) -> Result<StatusOutcome, sqlx::Error> {
        Ok(match self.find_by_provider_id(tenant_id, provider_message_id).await? {
            Some(existing) => StatusOutcome::Stale { current: existing.status },
            None => StatusOutcome::UnknownMessage,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{ContactStore, testing};
    use chrono::TimeZone;

    fn inbound(id: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage {
            provider_message_id: id.into(),
            from: "919876543210".into(),
            content: MessageContent::Text { text: text.into() },
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            context: None,
        }
    }

    fn status(id: &str, status: MessageStatus, secs: i64) -> StatusUpdate {
        StatusUpdate {
            provider_message_id: id.into(),
            status,
            timestamp: Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap(),
            error: None,
        }
    }

    /// Outbound row that the provider has acknowledged as `wamid`.
    async fn sent_message(store: &SqliteStore, tenant_id: &str, wamid: &str) -> MessageRecord {
        let pending = store
            .create_outbound(tenant_id, "15550001111", "919876543210", &MessageContent::Text {
                text: "hello".into(),
            })
            .await
            .unwrap();
        store
            .record_outbound_sent(tenant_id, wamid, &pending.id, Utc::now())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn inbound_is_stored_once_per_provider_id() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        let msg = inbound("wamid.A", "Hi");

        let first = store
            .record_inbound(&tenant.id, "1111", &msg, Some("Asha"))
            .await
            .unwrap();
        let InsertOutcome::Created { message: row, contact } = first else {
            panic!("first delivery must create a row");
        };
        assert_eq!(contact.total_messages, 1);
        assert_eq!(contact.name.as_deref(), Some("Asha"));
        assert_eq!(row.direction, Direction::Inbound);
        assert_eq!(row.status, MessageStatus::Delivered);
        assert_eq!(row.content.text(), Some("Hi"));

        for _ in 0..3 {
            let again = store.record_inbound(&tenant.id, "1111", &msg, None).await.unwrap();
            assert!(matches!(again, InsertOutcome::Duplicate));
        }
        assert_eq!(store.count_messages(&tenant.id, None).await.unwrap(), 1);
        let contact = store.get_contact(&tenant.id, "919876543210").await.unwrap().unwrap();
        assert_eq!(contact.total_messages, 1);
    }

    #[tokio::test]
    async fn failed_contact_upsert_rolls_back_the_message() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        let msg = inbound("wamid.R", "Hi");

        testing::fail_contact_writes(&store, true).await;
        assert!(store.record_inbound(&tenant.id, "1111", &msg, None).await.is_err());
        assert_eq!(store.count_messages(&tenant.id, None).await.unwrap(), 0);
        assert!(store.get_contact(&tenant.id, "919876543210").await.unwrap().is_none());

        testing::fail_contact_writes(&store, false).await;
        let retry = store.record_inbound(&tenant.id, "1111", &msg, None).await.unwrap();
        assert!(matches!(retry, InsertOutcome::Created { .. }));
        let contact = store.get_contact(&tenant.id, "919876543210").await.unwrap().unwrap();
        assert_eq!(contact.total_messages, 1);
    }

    #[tokio::test]
    async fn same_provider_id_in_two_tenants_is_two_rows() {
        let store = testing::store().await;
        let a = testing::tenant(&store, "1111").await;
        let b = testing::tenant(&store, "2222").await;
        let msg = inbound("wamid.SHARED", "Hi");

        assert!(matches!(
            store.record_inbound(&a.id, "1111", &msg, None).await.unwrap(),
            InsertOutcome::Created { .. }
        ));
        assert!(matches!(
            store.record_inbound(&b.id, "2222", &msg, None).await.unwrap(),
            InsertOutcome::Created { .. }
        ));
    }

    #[tokio::test]
    async fn out_of_order_statuses_settle_on_highest_rank() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        sent_message(&store, &tenant.id, "wamid.OUT").await;

        let read = store
            .apply_status(&tenant.id, &status("wamid.OUT", MessageStatus::Read, 20))
            .await
            .unwrap();
        assert!(matches!(read, StatusOutcome::Applied(ref m) if m.status == MessageStatus::Read));

        let late = store
            .apply_status(&tenant.id, &status("wamid.OUT", MessageStatus::Delivered, 10))
            .await
            .unwrap();
        assert!(matches!(late, StatusOutcome::Stale { current: MessageStatus::Read }));

        let row = store.find_by_provider_id(&tenant.id, "wamid.OUT").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Read);
        assert!(row.delivered_at.is_none());
        assert_eq!(row.read_at, Some(Utc.timestamp_opt(1_714_557_620, 0).unwrap()));
    }

    #[tokio::test]
    async fn duplicate_status_keeps_first_timestamp_earlier_first() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        sent_message(&store, &tenant.id, "wamid.E").await;

        let first = store
            .apply_status(&tenant.id, &status("wamid.E", MessageStatus::Delivered, 5))
            .await
            .unwrap();
        assert!(matches!(first, StatusOutcome::Applied(_)));
        let dup = store
            .apply_status(&tenant.id, &status("wamid.E", MessageStatus::Delivered, 30))
            .await
            .unwrap();
        assert!(matches!(dup, StatusOutcome::Stale { current: MessageStatus::Delivered }));

        let row = store.find_by_provider_id(&tenant.id, "wamid.E").await.unwrap().unwrap();
        assert_eq!(row.delivered_at, Some(Utc.timestamp_opt(1_714_557_605, 0).unwrap()));
    }

    #[tokio::test]
    async fn duplicate_status_keeps_first_timestamp_later_first() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        sent_message(&store, &tenant.id, "wamid.D").await;

        store
            .apply_status(&tenant.id, &status("wamid.D", MessageStatus::Delivered, 30))
            .await
            .unwrap();
        let dup = store
            .apply_status(&tenant.id, &status("wamid.D", MessageStatus::Delivered, 5))
            .await
            .unwrap();
        assert!(matches!(dup, StatusOutcome::Stale { current: MessageStatus::Delivered }));

        let row = store.find_by_provider_id(&tenant.id, "wamid.D").await.unwrap().unwrap();
        assert_eq!(row.delivered_at, Some(Utc.timestamp_opt(1_714_557_630, 0).unwrap()));
    }

    #[tokio::test]
    async fn failed_carries_error_and_is_terminal() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        sent_message(&store, &tenant.id, "wamid.F").await;

        let mut failed = status("wamid.F", MessageStatus::Failed, 3);
        failed.error = Some(MessageError {
            code: Some("131026".into()),
            message: Some("Message undeliverable".into()),
        });
        let applied = store.apply_status(&tenant.id, &failed).await.unwrap();
        let StatusOutcome::Applied(row) = applied else {
            panic!("failed must apply from sent");
        };
        assert_eq!(row.error.as_ref().and_then(|e| e.code.as_deref()), Some("131026"));
        assert!(row.failed_at.is_some());

        let after = store
            .apply_status(&tenant.id, &status("wamid.F", MessageStatus::Read, 9))
            .await
            .unwrap();
        assert!(matches!(after, StatusOutcome::Stale { current: MessageStatus::Failed }));
    }

    #[tokio::test]
    async fn failed_after_delivered_is_ignored() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        sent_message(&store, &tenant.id, "wamid.X").await;
        store
            .apply_status(&tenant.id, &status("wamid.X", MessageStatus::Delivered, 1))
            .await
            .unwrap();
        let outcome = store
            .apply_status(&tenant.id, &status("wamid.X", MessageStatus::Failed, 2))
            .await
            .unwrap();
        assert!(matches!(outcome, StatusOutcome::Stale { current: MessageStatus::Delivered }));
    }

    #[tokio::test]
    async fn status_for_unknown_message_creates_nothing() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        let outcome = store
            .apply_status(&tenant.id, &status("wamid.NOPE", MessageStatus::Delivered, 1))
            .await
            .unwrap();
        assert!(matches!(outcome, StatusOutcome::UnknownMessage));
        assert_eq!(store.count_messages(&tenant.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn status_is_scoped_to_tenant() {
        let store = testing::store().await;
        let owner = testing::tenant(&store, "1111").await;
        let other = testing::tenant(&store, "2222").await;
        sent_message(&store, &owner.id, "wamid.T").await;

        let outcome = store
            .apply_status(&other.id, &status("wamid.T", MessageStatus::Read, 1))
            .await
            .unwrap();
        assert!(matches!(outcome, StatusOutcome::UnknownMessage));
    }

    #[tokio::test]
    async fn attaching_provider_id_is_idempotent() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        let sent = sent_message(&store, &tenant.id, "wamid.S").await;
        assert_eq!(sent.status, MessageStatus::Sent);
        assert!(sent.sent_at.is_some());

        let again = store
            .record_outbound_sent(&tenant.id, "wamid.S", &sent.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.sent_at, sent.sent_at);

        let other_id = store
            .record_outbound_sent(&tenant.id, "wamid.OTHER", &sent.id, Utc::now())
            .await
            .unwrap();
        assert!(other_id.is_none());
    }

    #[tokio::test]
    async fn fail_outbound_only_touches_pending_rows() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        let pending = store
            .create_outbound(&tenant.id, "1111", "919876543210", &MessageContent::Text {
                text: "hi".into(),
            })
            .await
            .unwrap();
        let error = MessageError { code: Some("131047".into()), message: None };

        assert!(store.fail_outbound(&pending.id, &error, Utc::now()).await.unwrap());
        assert!(!store.fail_outbound(&pending.id, &error, Utc::now()).await.unwrap());
        let row = store.get_message(&tenant.id, &pending.id).await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn list_filters_by_counterparty() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        store
            .record_inbound(&tenant.id, "1111", &inbound("wamid.1", "a"), None)
            .await.unwrap();
        let mut other = inbound("wamid.2", "b");
        other.from = "447700900123".into();
        store.record_inbound(&tenant.id, "1111", &other, None).await.unwrap();

        let all = store.list_messages(&tenant.id, None, 50, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        let one = store
            .list_messages(&tenant.id, Some("447700900123"), 50, 0)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].provider_message_id.as_deref(), Some("wamid.2"));
    }
}

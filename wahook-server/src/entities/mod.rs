//! Persistence layer.
//!
//! Each collection has its own store trait ([`TenantStore`],
//! [`MessageStore`], [`ContactStore`]) implemented for [`SqliteStore`]. To
//! swap to another database, implement the traits for a new type and change
//! the concrete type in [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required here.
//!
//! Every mutation that can race with a concurrent webhook delivery is a
//! single SQL statement keyed by a unique constraint; nothing is read into
//! memory, modified, and written back.

pub mod contact;
pub mod dao;
pub mod message;
pub mod tenant;

pub use dao::{
    ContactRecord, Direction, InsertOutcome, MessageContent, MessageContext, MessageError,
    MessageRecord, MessageStatus, MessageType, NewContact, NewTenant, NormalizedMessage,
    StatusOutcome, StatusUpdate, TenantRecord,
};

pub use contact::ContactStore;
pub use message::MessageStore;
pub use tenant::TenantStore;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// SQLite-backed store for tenants, messages and contacts.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://wahook.db?mode=rwc"` or `"sqlite::memory:"` for tests.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives and dies with its connection, so it
        // gets exactly one that is never recycled.
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Round-trip a trivial query; used by the health endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ── timestamp helpers ─────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 (millisecond, `Z` suffix). Text comparison of two
/// values produced here matches chronological order, which the contact and
/// status SQL relies on.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(raw: &str, field: &'static str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, field, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}

pub(crate) fn parse_opt_ts(raw: Option<String>, field: &'static str) -> Option<DateTime<Utc>> {
    raw.as_deref().map(|r| parse_ts(r, field))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use uuid::Uuid;

    /// Fresh in-memory store with migrations applied.
    pub async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:")
            .await
            .expect("in-memory store")
    }

    /// Insert an active tenant routed by `phone_number_id`.
    pub async fn tenant(store: &SqliteStore, phone_number_id: &str) -> TenantRecord {
        let tenant = TenantRecord::from_new(
            Uuid::new_v4().to_string(),
            NewTenant {
                name: format!("tenant {phone_number_id}"),
                phone_number_id: Some(phone_number_id.to_owned()),
                ..NewTenant::default()
            },
            Utc::now(),
        );
        store
            .insert_tenant(tenant.clone())
            .await
            .expect("insert tenant");
        tenant
    }

    /// Make every insert or upsert into `contacts` abort until switched off.
    pub async fn fail_contact_writes(store: &SqliteStore, fail: bool) {
        let sql = if fail {
            "CREATE TRIGGER contacts_unavailable BEFORE INSERT ON contacts \
             BEGIN SELECT RAISE(ABORT, 'contacts unavailable'); END"
        } else {
            "DROP TRIGGER IF EXISTS contacts_unavailable"
        };
        sqlx::query(sql)
            .execute(&store.pool)
            .await
            .expect("toggle contacts trigger");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_timestamps_sort_like_time() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(fmt_ts(early) < fmt_ts(late));
        assert_eq!(fmt_ts(late), "2024-01-10T00:00:00.000Z");
    }

    #[test]
    fn parse_round_trips_formatted_value() {
        let ts = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(parse_ts(&fmt_ts(ts), "created_at"), ts);
    }
}

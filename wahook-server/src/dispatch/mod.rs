//! Everything that happens after a message or status has been persisted:
//! real-time events, auto-replies and read receipts.
//!
//! Events are published inline (they never block). Provider calls go through
//! the [`Outbox`], a bounded queue drained by an [`OutboxWorker`] that runs
//! every job in its own task so one slow or failing call never holds up the
//! next, and never reaches the webhook path.

pub mod realtime;
pub mod sender;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::Config;
use crate::entities::{
    ContactRecord, MessageContent, MessageRecord, MessageStatus, MessageStore, SqliteStore,
    TenantRecord, TenantStore, fmt_ts,
};
use crate::error::ServerError;

use self::realtime::{EventHub, MESSAGE_STATUS_EVENT, NEW_MESSAGE_EVENT};
use self::sender::{Credentials, MessageSender, SendError};

// ── Outbox ────────────────────────────────────────────────────────────────────

/// A provider call to make off the webhook path.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    AutoReply {
        tenant_id: String,
        to: String,
        text: String,
    },
    MarkAsRead {
        tenant_id: String,
        provider_message_id: String,
    },
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::AutoReply { .. } => "auto_reply",
            Job::MarkAsRead { .. } => "mark_as_read",
        }
    }

    fn tenant_id(&self) -> &str {
        match self {
            Job::AutoReply { tenant_id, .. } | Job::MarkAsRead { tenant_id, .. } => tenant_id,
        }
    }
}

/// Submitting half of the side-effect queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Job>,
}

impl Outbox {
    /// Queue `job` without waiting. A full or closed queue drops it.
    pub fn submit(&self, job: Job) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(job = job.name(), tenant_id = %job.tenant_id(), "outbox full; job dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(job = job.name(), tenant_id = %job.tenant_id(), "outbox closed; job dropped");
                false
            }
        }
    }
}

/// Draining half of the side-effect queue.
pub struct OutboxWorker {
    rx: mpsc::Receiver<Job>,
    ctx: Arc<JobContext>,
}

struct JobContext {
    store: Arc<SqliteStore>,
    sender: Arc<dyn MessageSender>,
    realtime: Arc<EventHub>,
    default_access_token: Option<String>,
}

pub fn outbox(
    config: &Config,
    store: Arc<SqliteStore>,
    sender: Arc<dyn MessageSender>,
    realtime: Arc<EventHub>,
) -> (Outbox, OutboxWorker) {
    let (tx, rx) = mpsc::channel(config.outbox_capacity.max(1));
    let ctx = Arc::new(JobContext {
        store,
        sender,
        realtime,
        default_access_token: config.default_access_token.clone(),
    });
    (Outbox { tx }, OutboxWorker { rx, ctx })
}

impl OutboxWorker {
    /// Run until every [`Outbox`] handle is dropped, then wait for in-flight
    /// jobs.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        while let Some(job) = self.rx.recv().await {
            let span = info_span!("outbox_job", job = job.name(), tenant_id = %job.tenant_id());
            tasks.spawn(run_job(Arc::clone(&self.ctx), job).instrument(span));
            while let Some(done) = tasks.try_join_next() {
                log_join(done);
            }
        }
        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(in_flight, "outbox closed; waiting for in-flight jobs");
        }
        while let Some(done) = tasks.join_next().await {
            log_join(done);
        }
        info!("outbox drained");
    }
}

fn log_join(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        warn!(error = %e, "outbox job panicked");
    }
}

async fn run_job(ctx: Arc<JobContext>, job: Job) {
    let tenant_id = job.tenant_id().to_owned();
    let tenant = match ctx.store.get_tenant(&tenant_id).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            warn!("tenant vanished before job ran");
            return;
        }
        Err(e) => {
            warn!(error = %e, "failed to load tenant for job");
            return;
        }
    };
    let creds = match Credentials::for_tenant(&tenant, ctx.default_access_token.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "job skipped");
            return;
        }
    };

    match job {
        Job::AutoReply { to, text, .. } => {
            let content = MessageContent::Text { text };
            match send_and_record(
                &ctx.store,
                ctx.sender.as_ref(),
                &ctx.realtime,
                &creds,
                &tenant,
                &to,
                content,
            )
            .await
            {
                Ok(message) => info!(message_id = %message.id, to = %to, "auto-reply sent"),
                Err(e) => warn!(error = %e, to = %to, "auto-reply failed"),
            }
        }
        Job::MarkAsRead {
            provider_message_id,
            ..
        } => match ctx.sender.mark_as_read(&creds, &provider_message_id).await {
            Ok(()) => debug!(wamid = %provider_message_id, "marked as read"),
            Err(e) => warn!(wamid = %provider_message_id, error = %e, "mark-as-read failed"),
        },
    }
}

// ── Outbound send ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Send(#[from] SendError),
}

impl From<OutboundError> for ServerError {
    fn from(e: OutboundError) -> Self {
        match e {
            OutboundError::Database(e) => ServerError::Database(e),
            OutboundError::Send(e) => ServerError::Send(e),
        }
    }
}

/// Create a `pending` row, hand it to the provider and record the outcome:
/// `sent` with the provider id, or `failed` with the provider's error.
pub async fn send_and_record(
    store: &SqliteStore,
    sender: &dyn MessageSender,
    realtime: &EventHub,
    creds: &Credentials,
    tenant: &TenantRecord,
    to: &str,
    content: MessageContent,
) -> Result<MessageRecord, OutboundError> {
    let pending = store
        .create_outbound(&tenant.id, &tenant.sender_number(), to, &content)
        .await?;

    let provider_id = match sender.send(creds, to, &content).await {
        Ok(id) => id,
        Err(e) => {
            if let Err(db) = store
                .fail_outbound(&pending.id, &e.to_message_error(), Utc::now())
                .await
            {
                warn!(message_id = %pending.id, error = %db, "failed to mark outbound message failed");
            }
            return Err(e.into());
        }
    };

    match store
        .record_outbound_sent(&tenant.id, &provider_id, &pending.id, Utc::now())
        .await?
    {
        Some(sent) => {
            realtime.publish(&tenant.channel(), MESSAGE_STATUS_EVENT, status_payload(&sent));
            Ok(sent)
        }
        None => {
            warn!(message_id = %pending.id, wamid = %provider_id, "provider id not attached");
            Ok(pending)
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Fan-out after persistence. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    realtime: Arc<EventHub>,
    outbox: Outbox,
    mark_as_read: bool,
}

impl Dispatcher {
    pub fn new(realtime: Arc<EventHub>, outbox: Outbox, mark_as_read: bool) -> Self {
        Self {
            realtime,
            outbox,
            mark_as_read,
        }
    }

    /// A new inbound message was stored (never called for duplicates).
    pub fn message_received(
        &self,
        tenant: &TenantRecord,
        message: &MessageRecord,
        contact: &ContactRecord,
    ) {
        self.realtime.publish(
            &tenant.channel(),
            NEW_MESSAGE_EVENT,
            new_message_payload(message, contact),
        );

        if self.mark_as_read
            && let Some(wamid) = &message.provider_message_id
        {
            self.outbox.submit(Job::MarkAsRead {
                tenant_id: tenant.id.clone(),
                provider_message_id: wamid.clone(),
            });
        }

        if message.content.text().is_none() {
            return;
        }
        let Some(reply) = tenant.auto_reply_text() else {
            return;
        };
        if contact.is_blocked {
            debug!(tenant_id = %tenant.id, to = %message.from_number, "contact blocked; no auto-reply");
            return;
        }
        self.outbox.submit(Job::AutoReply {
            tenant_id: tenant.id.clone(),
            to: message.from_number.clone(),
            text: reply.to_owned(),
        });
    }

    /// A status callback moved a message forward.
    pub fn status_changed(&self, tenant: &TenantRecord, message: &MessageRecord) {
        self.realtime
            .publish(&tenant.channel(), MESSAGE_STATUS_EVENT, status_payload(message));
    }
}

pub fn new_message_payload(message: &MessageRecord, contact: &ContactRecord) -> Value {
    json!({
        "message": message.to_response(),
        "contact": { "waId": contact.wa_id, "name": contact.display_name() },
    })
}

pub fn status_payload(message: &MessageRecord) -> Value {
    let timestamp = match message.status {
        MessageStatus::Sent => message.sent_at,
        MessageStatus::Delivered => message.delivered_at,
        MessageStatus::Read => message.read_at,
        MessageStatus::Failed => message.failed_at,
        MessageStatus::Pending => None,
    }
    .unwrap_or(message.updated_at);

    let mut payload = json!({
        "messageId": message.id,
        "waMessageId": message.provider_message_id,
        "status": message.status.to_string(),
        "timestamp": fmt_ts(timestamp),
    });
    if let Some(error) = &message.error {
        payload["error"] = json!({ "code": error.code, "message": error.message });
    }
    payload
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::sender::testing::RecordingSender;
    use super::*;
    use crate::entities::{
        ContactStore, Direction, MessageError, MessageType, NewContact, NewTenant, testing,
    };

    async fn tenant_with_token(store: &SqliteStore) -> TenantRecord {
        let tenant = testing::tenant(store, "1111").await;
        store.set_auto_reply(&tenant.id, true, Some("Thanks!")).await.unwrap();
        store.get_tenant(&tenant.id).await.unwrap().unwrap()
    }

    fn start(
        store: &Arc<SqliteStore>,
        sender: &Arc<RecordingSender>,
        capacity: usize,
    ) -> (Outbox, OutboxWorker, Arc<EventHub>) {
        let config = Config {
            outbox_capacity: capacity,
            default_access_token: Some("token".into()),
            ..Config::default()
        };
        let hub = Arc::new(EventHub::new(8));
        let (outbox, worker) = outbox(
            &config,
            Arc::clone(store),
            Arc::clone(sender) as Arc<dyn MessageSender>,
            Arc::clone(&hub),
        );
        (outbox, worker, hub)
    }

    #[tokio::test]
    async fn auto_reply_job_records_sent_message() {
        let store = Arc::new(testing::store().await);
        let tenant = tenant_with_token(&store).await;
        let sender = Arc::new(RecordingSender::default());
        let (outbox, worker, hub) = start(&store, &sender, 8);
        let mut events = hub.subscribe(&tenant.channel());

        assert!(outbox.submit(Job::AutoReply {
            tenant_id: tenant.id.clone(),
            to: "919876543210".into(),
            text: "Thanks!".into(),
        }));
        drop(outbox);
        worker.run().await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "919876543210");

        let rows = store.list_messages(&tenant.id, None, 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MessageStatus::Sent);
        assert_eq!(rows[0].provider_message_id.as_deref(), Some("wamid.OUT0"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.event, MESSAGE_STATUS_EVENT);
        assert_eq!(event.payload["status"], "sent");
    }

    #[tokio::test]
    async fn rejected_send_marks_row_failed() {
        let store = Arc::new(testing::store().await);
        let tenant = tenant_with_token(&store).await;
        let sender = RecordingSender::rejecting("Recipient not on WhatsApp");

        let err = send_and_record(
            &store,
            &sender,
            &EventHub::new(4),
            &Credentials {
                phone_number_id: "1111".into(),
                access_token: "t".into(),
            },
            &tenant,
            "919876543210",
            MessageContent::Text { text: "Hi".into() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OutboundError::Send(SendError::Provider { .. })));

        let rows = store.list_messages(&tenant.id, None, 10, 0).await.unwrap();
        assert_eq!(rows[0].status, MessageStatus::Failed);
        assert_eq!(
            rows[0].error.as_ref().and_then(|e| e.message.as_deref()),
            Some("Recipient not on WhatsApp")
        );
    }

    #[tokio::test]
    async fn job_for_tenant_without_credentials_is_skipped() {
        let store = Arc::new(testing::store().await);
        let tenant = TenantRecord::from_new(
            "no-phone".into(),
            NewTenant {
                name: "No phone".into(),
                ..NewTenant::default()
            },
            Utc::now(),
        );
        store.insert_tenant(tenant.clone()).await.unwrap();
        let sender = Arc::new(RecordingSender::default());
        let (outbox, worker, _hub) = start(&store, &sender, 8);

        outbox.submit(Job::MarkAsRead {
            tenant_id: tenant.id.clone(),
            provider_message_id: "wamid.X".into(),
        });
        drop(outbox);
        worker.run().await;
        assert!(sender.reads().is_empty());
    }

    #[tokio::test]
    async fn full_outbox_drops_instead_of_blocking() {
        let store = Arc::new(testing::store().await);
        let sender = Arc::new(RecordingSender::default());
        let (outbox, _worker, _hub) = start(&store, &sender, 1);
        let job = Job::MarkAsRead {
            tenant_id: "t".into(),
            provider_message_id: "wamid.X".into(),
        };
        assert!(outbox.submit(job.clone()));
        assert!(!outbox.submit(job));
    }

    #[tokio::test]
    async fn auto_reply_only_for_text_and_unblocked_contacts() {
        let store = Arc::new(testing::store().await);
        let tenant = tenant_with_token(&store).await;
        let sender = Arc::new(RecordingSender::default());
        let (outbox, worker, hub) = start(&store, &sender, 8);
        let dispatcher = Dispatcher::new(hub, outbox.clone(), false);

        let make = |content: MessageContent| MessageRecord {
            id: "m".into(),
            tenant_id: tenant.id.clone(),
            provider_message_id: Some("wamid.IN".into()),
            direction: Direction::Inbound,
            message_type: content.message_type(),
            from_number: "919876543210".into(),
            to_number: "1111".into(),
            content,
            status: MessageStatus::Delivered,
            sent_at: None,
            delivered_at: Some(Utc::now()),
            read_at: None,
            failed_at: None,
            error: None,
            context: None,
            provider_timestamp: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let contact = store
            .create_contact(&tenant.id, &NewContact {
                wa_id: "919876543210".into(),
                name: None,
                opt_in_source: None,
            })
            .await
            .unwrap();
        dispatcher.message_received(
            &tenant,
            &make(MessageContent::Image(Default::default())),
            &contact,
        );
        let blocked = store
            .set_blocked(&tenant.id, "919876543210", true)
            .await
            .unwrap()
            .unwrap();
        dispatcher.message_received(
            &tenant,
            &make(MessageContent::Text { text: "hi".into() }),
            &blocked,
        );
        dispatcher.message_received(
            &tenant,
            &make(MessageContent::Text { text: "hi".into() }),
            &contact,
        );

        drop(dispatcher);
        drop(outbox);
        worker.run().await;
        assert_eq!(sender.sent().len(), 1);
    }

    #[test]
    fn status_payload_uses_the_status_timestamp() {
        let at = Utc::now();
        let message = MessageRecord {
            id: "local".into(),
            tenant_id: "t".into(),
            provider_message_id: Some("wamid.A".into()),
            direction: Direction::Outbound,
            message_type: MessageType::Text,
            from_number: "1".into(),
            to_number: "2".into(),
            content: MessageContent::Text { text: "x".into() },
            status: MessageStatus::Failed,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            failed_at: Some(at),
            error: Some(MessageError {
                code: Some("131026".into()),
                message: Some("Undeliverable".into()),
            }),
            context: None,
            provider_timestamp: None,
            created_at: at,
            updated_at: at,
        };
        let payload = status_payload(&message);
        assert_eq!(payload["messageId"], "local");
        assert_eq!(payload["waMessageId"], "wamid.A");
        assert_eq!(payload["timestamp"], fmt_ts(at));
        assert_eq!(payload["error"]["code"], "131026");
    }
}

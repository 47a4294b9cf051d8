//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::realtime::EventHub;
use crate::dispatch::sender::MessageSender;
use crate::dispatch::{self, Dispatcher, OutboxWorker};
use crate::entities::SqliteStore;

/// State shared by the HTTP handlers and the detached webhook processing.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Tenants, messages and contacts.
    pub store: Arc<SqliteStore>,
    /// Per-tenant real-time channels.
    pub realtime: Arc<EventHub>,
    /// Provider client for sends made directly by handlers.
    pub sender: Arc<dyn MessageSender>,
    /// Post-persistence fan-out (events, auto-replies, read receipts).
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Wire the state together. The returned worker must be spawned; it stops
    /// once every clone of the state is dropped.
    pub fn new(
        config: Config,
        store: SqliteStore,
        sender: Arc<dyn MessageSender>,
    ) -> (Arc<Self>, OutboxWorker) {
        let config = Arc::new(config);
        let store = Arc::new(store);
        let realtime = Arc::new(EventHub::new(config.event_buffer));
        let (outbox, worker) = dispatch::outbox(
            &config,
            Arc::clone(&store),
            Arc::clone(&sender),
            Arc::clone(&realtime),
        );
        let dispatcher = Dispatcher::new(Arc::clone(&realtime), outbox, config.mark_as_read);
        let state = Arc::new(Self {
            config,
            store,
            realtime,
            sender,
            dispatcher,
        });
        (state, worker)
    }
}

/// State over a fresh in-memory store.
#[cfg(test)]
pub(crate) async fn test_state(
    config: Config,
    sender: Arc<dyn MessageSender>,
) -> (Arc<AppState>, OutboxWorker) {
    let store = crate::entities::testing::store().await;
    AppState::new(config, store, sender)
}

//! Per-tenant real-time fan-out.
//!
//! Each channel (`tenant-{id}`) is a [`broadcast`] channel created on first
//! subscription. Publishing never blocks and never fails the caller: with no
//! subscribers the event is simply dropped, and slow subscribers lag rather
//! than back-pressure the webhook pipeline.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{trace, warn};

pub const NEW_MESSAGE_EVENT: &str = "new-message";
pub const MESSAGE_STATUS_EVENT: &str = "message-status";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct EventHub {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<RealtimeEvent>>>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<RealtimeEvent> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Emit `event` on `channel`; returns how many subscribers received it.
    pub fn publish(&self, channel: &str, event: &str, payload: Value) -> usize {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(channel, event, "event hub lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        let Some(sender) = channels.get(channel) else {
            trace!(channel, event, "no subscribers; event dropped");
            return 0;
        };

        let message = RealtimeEvent {
            channel: channel.to_owned(),
            event: event.to_owned(),
            payload,
            emitted_at: Utc::now(),
        };
        match sender.send(message) {
            Ok(n) => n,
            Err(_) => {
                // Every receiver is gone; forget the channel.
                channels.remove(channel);
                trace!(channel, event, "last subscriber left; channel closed");
                0
            }
        }
    }

    #[cfg(test)]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or_default()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

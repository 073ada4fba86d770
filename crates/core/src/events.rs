//! Webhook event emission.
//!
//! Services and background loops emit [`WebhookEvent`]s through an
//! [`EventHandle`]; a delivery task on the other end of the channel owns
//! actually posting them to subscribers. Emission never fails the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events published to webhook subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookEvent {
    #[serde(rename = "torrent.added")]
    TorrentAdded {
        download_id: String,
        name: String,
        info_hash: String,
    },

    #[serde(rename = "torrent.started")]
    TorrentStarted { download_id: String, name: String },

    #[serde(rename = "torrent.progress")]
    TorrentProgress {
        download_id: String,
        name: String,
        progress_pct: f64,
    },

    #[serde(rename = "torrent.completed")]
    TorrentCompleted { download_id: String, name: String },

    #[serde(rename = "torrent.failed")]
    TorrentFailed {
        download_id: String,
        name: String,
        error: String,
    },

    #[serde(rename = "torrent.removed")]
    TorrentRemoved { download_id: String, name: String },

    #[serde(rename = "vpn.disconnected")]
    VpnDisconnected {
        paused_downloads: u64,
        download_ids: Vec<String>,
    },
}

impl WebhookEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            WebhookEvent::TorrentAdded { .. } => "torrent.added",
            WebhookEvent::TorrentStarted { .. } => "torrent.started",
            WebhookEvent::TorrentProgress { .. } => "torrent.progress",
            WebhookEvent::TorrentCompleted { .. } => "torrent.completed",
            WebhookEvent::TorrentFailed { .. } => "torrent.failed",
            WebhookEvent::TorrentRemoved { .. } => "torrent.removed",
            WebhookEvent::VpnDisconnected { .. } => "vpn.disconnected",
        }
    }
}

/// Envelope wrapping an event with its emission timestamp
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WebhookEvent,
}

/// Handle for emitting webhook events
///
/// Cheaply cloneable and shared across tasks. Events flow through an async
/// channel to whatever delivery mechanism is attached on the receiving end.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<WebhookEnvelope>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<WebhookEnvelope>) -> Self {
        Self { tx }
    }

    /// Create a handle together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WebhookEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event asynchronously
    ///
    /// Non-blocking for practical purposes. If the channel is closed the
    /// error is logged but the caller is not failed.
    pub async fn emit(&self, event: WebhookEvent) {
        let envelope = WebhookEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit webhook event: {}", e);
        }
    }

    /// Try to emit without blocking
    ///
    /// Returns true if the event was queued.
    pub fn try_emit(&self, event: WebhookEvent) -> bool {
        let envelope = WebhookEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit webhook event: {}", e);
                false
            }
        }
    }
}

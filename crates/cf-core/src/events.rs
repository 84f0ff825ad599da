//! Outbound notifications and the bus that carries them to the host.
//!
//! [`NotificationBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring buffer of recent notifications so a late subscriber can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

use crate::ids::NotificationId;
use crate::model::FileRecord;

/// Maximum number of notifications retained in the ring buffer.
const MAX_RECENT: usize = 16;

/// Message sent when a scan or a save cycle finds nothing to show.
pub const EMPTY_FOLDER_MESSAGE: &str =
    "The folder you chose doesn't exist or is empty. Please try a different one.";

/// Outbound notification to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notification", content = "payload")]
pub enum Notification {
    /// Full catalog snapshot, once per completed save cycle.
    #[serde(rename = "FILES")]
    Files(Vec<FileRecord>),
    /// Something the user has to act on.
    #[serde(rename = "ERROR")]
    Error(String),
}

impl Notification {
    pub fn empty_folder() -> Self {
        Notification::Error(EMPTY_FOLDER_MESSAGE.to_string())
    }
}

/// A timestamped notification as stored on the bus.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: NotificationId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}

impl Envelope {
    fn new(notification: Notification) -> Self {
        Self {
            id: NotificationId::new(),
            timestamp: Utc::now(),
            notification,
        }
    }
}

/// Broadcast channel with a bounded ring buffer of recent notifications.
pub struct NotificationBus {
    tx: broadcast::Sender<Envelope>,
    recent: RwLock<VecDeque<Envelope>>,
}

impl NotificationBus {
    /// `capacity` is the broadcast buffer size, not the ring buffer size.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Broadcast to all current subscribers and keep a copy in the ring
    /// buffer.
    pub fn publish(&self, notification: Notification) {
        let envelope = Envelope::new(notification);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT {
                recent.pop_back();
            }
            recent.push_front(envelope.clone());
        }

        if self.tx.send(envelope).is_err() {
            tracing::debug!("No subscribers for notification");
        }
    }

    /// Return the `n` most recent notifications (newest first).
    pub fn recent(&self, n: usize) -> Vec<Envelope> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(64)
    }
}

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now - self.created_at >= ttl,
            Err(_) => false,
        }
    }
}

/// Session-scoped notification list. Entries expire after their TTL or on
/// dismissal and are never persisted.
#[derive(Clone)]
pub struct NotificationCenter {
    entries: Arc<RwLock<Vec<Notification>>>,
    sender: broadcast::Sender<Notification>,
    ttl: Duration,
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            sender,
            ttl,
        }
    }

    pub fn push(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        tx_hash: Option<String>,
    ) -> Uuid {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            tx_hash,
            created_at: Utc::now(),
            ttl: self.ttl,
        };
        let id = notification.id;

        self.entries.write().push(notification.clone());
        // no subscribers is fine
        let _ = self.sender.send(notification);
        id
    }

    pub fn info(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Info, message, None)
    }

    pub fn success(&self, message: impl Into<String>, tx_hash: Option<String>) -> Uuid {
        self.push(NotificationKind::Success, message, tx_hash)
    }

    pub fn warning(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Warning, message, None)
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Error, message, None)
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|n| n.id != id);
        entries.len() != before
    }

    /// Drop expired entries, returning how many were removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|n| !n.is_expired(now));
        before - entries.len()
    }

    pub fn active(&self) -> Vec<Notification> {
        self.entries.read().clone()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.entries.read().iter().filter(|n| n.kind == kind).count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

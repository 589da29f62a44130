use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub seq: i64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

pub struct SyncBus {
    tx: broadcast::Sender<SyncEvent>,
    seq: AtomicI64,
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            seq: AtomicI64::new(0),
        }
    }

    /// Build and publish an event. Nobody listening is not an error.
    pub fn emit(&self, kind: impl Into<String>, payload: serde_json::Value) -> SyncEvent {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = SyncEvent {
            id: Uuid::new_v4().to_string(),
            seq,
            kind: kind.into(),
            payload,
            created_at: Utc::now().to_rfc3339(),
        };
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(kind = %event.kind, "sync bus has no receivers");
        }
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

//! Best-effort, fire-and-forget broadcast of transfer lifecycle events to
//! all observers subscribed at event time. A lagging subscriber misses
//! older events and keeps receiving new ones; `broadcast::Sender::send`
//! never awaits a slow receiver, so a stalled observer cannot block the
//! Ingestor.

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum TransferEvent {
    Manifest {
        file_id: String,
        filename: String,
        total_chunks: u32,
    },
    Chunk {
        file_id: String,
        chunk_id: u32,
        received: u32,
        total: u32,
        filename: String,
        chunk_size: u64,
        speed: f64,
    },
    TransferComplete {
        file_id: String,
        filename: String,
    },
    Assembled {
        file_id: String,
        filename: String,
        path: String,
    },
    Error {
        file_id: String,
        message: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TransferEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget. Returns the number of active subscribers, or 0 if
    /// there were none to receive it — never an error a caller must react to.
    pub fn publish(&self, event: TransferEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

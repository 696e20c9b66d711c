//! Host bus boundary.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] carrying the
//! augmented events the bridge republishes. [`spawn_bus_adapter`] is the
//! single queue consumer: it drains the dispatch queue, derives the file
//! name for each event, and publishes until it pops the stop sentinel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::event::StoreEvent;
use crate::queue::{DispatchReceiver, QueueItem};

/// Event shape republished to the host bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Store-side event pattern that matched.
    pub event_name: String,
    /// Bucket the object lives in.
    pub bucket: String,
    /// Object key, percent-decoded.
    pub key: String,
    /// Normalized user metadata.
    pub metadata: HashMap<String, String>,
    /// Final path segment of `key`.
    pub file_name: String,
}

impl From<StoreEvent> for BusEvent {
    fn from(event: StoreEvent) -> Self {
        let file_name = event.file_name().to_string();
        Self {
            event_name: event.event_name,
            bucket: event.bucket,
            key: event.key,
            metadata: event.metadata,
            file_name,
        }
    }
}

/// Broadcast channel for bridge events.
///
/// Cheap to clone. Publishing with no subscribers drops the event, which is
/// the desired behavior for a notification fan-out.
#[derive(Debug, Clone)]
pub struct Bus {
    tx: broadcast::Sender<BusEvent>,
}

impl Bus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

/// Spawn the consumer that drains `receiver` onto `bus`. The task exits
/// when it pops the stop sentinel (or when every producer is gone).
pub fn spawn_bus_adapter(mut receiver: DispatchReceiver, bus: Bus) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.pop().await {
                QueueItem::Event(event) => bus.publish(event.into()),
                QueueItem::Stop => break,
            }
        }
        info!("bus adapter stopped");
    })
}

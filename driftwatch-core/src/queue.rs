//! Dispatch queue between notification producers and the bus consumer.
//!
//! Producers (stream readers, local watch pipelines) push from any task or
//! thread without blocking; a single consumer pops in order. Shutdown is a
//! distinguished sentinel so the consumer drains everything queued before
//! the request to stop.

use tokio::sync::mpsc;

use crate::event::StoreEvent;

/// One unit of work handed from a producer to the consumer.
#[derive(Debug)]
pub enum QueueItem {
    /// A decoded change notification.
    Event(StoreEvent),
    /// No more items will be pushed; the consumer should exit its loop.
    Stop,
}

/// Producer half. Cheap to clone; `push` never blocks.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

/// Consumer half, owned by exactly one task.
#[derive(Debug)]
pub struct DispatchReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
}

/// Create a connected producer/consumer pair.
pub fn dispatch_queue() -> (DispatchQueue, DispatchReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchQueue { tx }, DispatchReceiver { rx })
}

impl DispatchQueue {
    /// Enqueue an event. Items from a single producer are observed by the
    /// consumer in push order; no order is guaranteed across producers.
    pub fn push(&self, event: StoreEvent) {
        let _ = self.tx.send(QueueItem::Event(event));
    }

    /// Enqueue the stop sentinel. Producers may keep pushing afterwards,
    /// but the consumer stops at the sentinel.
    pub fn shutdown(&self) {
        let _ = self.tx.send(QueueItem::Stop);
    }
}

impl DispatchReceiver {
    /// Wait for the next item. A closed channel behaves like [`QueueItem::Stop`]
    /// so the consumer never hangs on producers that dropped without an
    /// explicit shutdown.
    pub async fn pop(&mut self) -> QueueItem {
        self.rx.recv().await.unwrap_or(QueueItem::Stop)
    }
}

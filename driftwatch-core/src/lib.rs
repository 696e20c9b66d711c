//! # Driftwatch Core
//!
//! Bridges change notifications from an object store (and, in a local
//! variant, a filesystem) into a downstream event bus, coalescing bursts of
//! rapid-fire events per key so consumers see one settled notification
//! instead of a storm.
//!
//! ## Overview
//!
//! Two producer paths converge on the same event shape:
//!
//! - **Remote**: a long-lived streaming subscription against the store's
//!   per-bucket notification endpoint. Each newline-delimited record is
//!   decoded and pushed into the dispatch queue; the bus adapter drains the
//!   queue and republishes to the host bus.
//! - **Local**: recursive filesystem watches routed through a shared
//!   debounce scheduler, so repeated writes to the same file collapse into
//!   one callback fired after the quiet period.
//!
//! ## Architecture
//!
//! - [`decode`]: pure parsing of one raw notification line
//! - [`stream`]: resilient reader owning one persistent subscription
//!   connection, reconnecting with bounded backoff on transient failure
//! - [`queue`]: thread-safe FIFO hand-off from producers to the single
//!   consumer, with a stop sentinel for graceful shutdown
//! - [`debounce`]: per-key quiet-period scheduling on a single loop task
//! - [`fs_watch`]: filesystem watch groups sharing one scheduler
//! - [`bus`]: host bus boundary and the queue-draining adapter
//! - [`store`]: object put/get/remove plus the local path allowlist

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Host bus boundary and the dispatch-queue consumer.
pub mod bus;

/// Per-key debounce scheduling.
pub mod debounce;

/// Notification line decoding.
pub mod decode;

/// Error types and the crate-wide result alias.
pub mod error;

/// Event shapes shared across the pipeline.
pub mod event;

/// Filesystem watch groups.
pub mod fs_watch;

/// Producer-to-consumer dispatch queue.
pub mod queue;

/// Object-store operations and path allowlisting.
pub mod store;

/// Long-lived notification stream reader.
pub mod stream;

pub use bus::{Bus, BusEvent, spawn_bus_adapter};
pub use debounce::{DebounceHandle, DebounceScheduler};
pub use decode::{Decoded, decode_line};
pub use error::{BridgeError, Result};
pub use event::StoreEvent;
pub use fs_watch::{WatchGroup, WatchGroupConfig};
pub use queue::{DispatchQueue, DispatchReceiver, QueueItem, dispatch_queue};
pub use store::{Credentials, ObjectStoreClient, PathAllowlist};
pub use stream::{BackoffConfig, EventStreamReader, StreamReaderHandle, Subscription};

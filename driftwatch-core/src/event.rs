//! Event shapes shared across the bridge pipeline.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One change notification, as decoded from the stream or synthesized from
/// a local filesystem change.
///
/// Instances are immutable value objects: created by the decoder, consumed
/// once by the bus adapter, then discarded. `bucket` and `key` are always
/// non-empty; records missing either are dropped upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    /// Store-side event pattern that matched, e.g. `s3:ObjectCreated:Put`.
    pub event_name: String,
    /// Bucket the object lives in. For local events, the watched root.
    pub bucket: String,
    /// Object key, percent-decoded.
    pub key: String,
    /// User metadata with the vendor prefix stripped and keys lowercased.
    pub metadata: HashMap<String, String>,
}

impl StoreEvent {
    /// Final path segment of the object key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or_default()
    }

    /// Synthesize an event for a settled local filesystem change, so the
    /// local watch path converges on the same shape the remote stream
    /// produces. `bucket` becomes the watched root and `key` the path
    /// relative to it.
    pub fn from_local_change(root: &Path, path: &Path, event_name: &str) -> Self {
        let key = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");

        Self {
            event_name: event_name.to_string(),
            bucket: root.to_string_lossy().into_owned(),
            key,
            metadata: HashMap::new(),
        }
    }
}

//! Notification line decoding.
//!
//! One raw line from the notification stream either carries a batch of
//! change records or is a keep-alive. Parsing is pure; the surrounding
//! reader owns all connection state and decides what a parse failure means.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::event::StoreEvent;

/// Case-insensitive prefix marking user metadata entries on object records.
const METADATA_PREFIX: &str = "x-amz-meta-";

/// Outcome of decoding one non-blank stream line.
#[derive(Debug)]
pub enum Decoded {
    /// The line carried records; invalid ones have already been dropped.
    Events(Vec<StoreEvent>),
    /// `{"Records": null}` — the connection is alive, nothing changed.
    KeepAlive,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Records")]
    records: Option<Vec<RawRecord>>,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    #[serde(default)]
    s3: RawS3,
}

#[derive(Deserialize, Default)]
struct RawS3 {
    #[serde(default)]
    bucket: RawBucket,
    #[serde(default)]
    object: RawObject,
}

#[derive(Deserialize, Default)]
struct RawBucket {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Default)]
struct RawObject {
    #[serde(default)]
    key: String,
    #[serde(rename = "userMetadata", default)]
    user_metadata: HashMap<String, String>,
}

/// Decode one raw line. A parse failure means the connection is delivering
/// garbage and should be torn down by the caller; records missing a bucket
/// or key are logged and skipped without affecting the rest of the batch.
pub fn decode_line(line: &str) -> Result<Decoded, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(line)?;
    let Some(records) = envelope.records else {
        return Ok(Decoded::KeepAlive);
    };

    let mut events = Vec::with_capacity(records.len());
    for record in records {
        if record.s3.bucket.name.is_empty() || record.s3.object.key.is_empty() {
            warn!(
                bucket = %record.s3.bucket.name,
                key = %record.s3.object.key,
                "skipping record without bucket or key"
            );
            continue;
        }

        events.push(StoreEvent {
            event_name: record.event_name,
            bucket: record.s3.bucket.name,
            key: percent_decode(&record.s3.object.key),
            metadata: normalize_metadata(&record.s3.object.user_metadata),
        });
    }

    Ok(Decoded::Events(events))
}

fn percent_decode(key: &str) -> String {
    match urlencoding::decode(key) {
        Ok(decoded) => decoded.into_owned(),
        // Keys with stray percent signs pass through undecoded.
        Err(_) => key.to_string(),
    }
}

/// Keep only vendor metadata entries, stripping the prefix and lowercasing
/// the remainder. Collisions after lowercasing are last-write-wins.
pub fn normalize_metadata(metadata: &HashMap<String, String>) -> HashMap<String, String> {
    let mut normalized = HashMap::new();
    for (meta_key, value) in metadata {
        if meta_key.len() < METADATA_PREFIX.len() {
            continue;
        }
        let (prefix, rest) = meta_key.split_at(METADATA_PREFIX.len());
        if !prefix.eq_ignore_ascii_case(METADATA_PREFIX) {
            continue;
        }
        normalized.insert(rest.to_ascii_lowercase(), value.clone());
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_line(bucket: &str, key: &str) -> String {
        format!(
            r#"{{"Records": [{{"eventName": "s3:ObjectCreated:Put", "s3": {{"bucket": {{"name": "{bucket}"}}, "object": {{"key": "{key}", "userMetadata": {{"X-Amz-Meta-Foo": "bar"}}}}}}}}]}}"#
        )
    }

    #[test]
    fn decodes_single_record() {
        let Decoded::Events(events) = decode_line(&record_line("camera", "snapshot.jpg")).unwrap()
        else {
            panic!("expected events");
        };

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "s3:ObjectCreated:Put");
        assert_eq!(events[0].bucket, "camera");
        assert_eq!(events[0].key, "snapshot.jpg");
        assert_eq!(events[0].metadata["foo"], "bar");
    }

    #[test]
    fn null_records_is_keep_alive() {
        assert!(matches!(
            decode_line(r#"{"Records": null}"#).unwrap(),
            Decoded::KeepAlive
        ));
    }

    #[test]
    fn percent_decodes_the_key() {
        let Decoded::Events(events) = decode_line(&record_line("camera", "a%20b.txt")).unwrap()
        else {
            panic!("expected events");
        };
        assert_eq!(events[0].key, "a b.txt");
    }

    #[test]
    fn skips_records_missing_bucket_or_key() {
        let line = r#"{"Records": [
            {"eventName": "e1", "s3": {"bucket": {"name": "b"}, "object": {"key": "k"}}},
            {"eventName": "e2", "s3": {"bucket": {"name": ""}, "object": {"key": "k"}}},
            {"eventName": "e3", "s3": {"bucket": {"name": "b"}, "object": {"key": ""}}}
        ]}"#;

        let Decoded::Events(events) = decode_line(line).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "e1");
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(decode_line("{not json").is_err());
    }

    #[test]
    fn metadata_prefix_check_is_case_insensitive() {
        let metadata = HashMap::from([
            ("X-AMZ-META-Camera-ID".to_string(), "front".to_string()),
            ("x-amz-meta-zone".to_string(), "garden".to_string()),
            ("Content-Type".to_string(), "image/jpeg".to_string()),
        ]);

        let normalized = normalize_metadata(&metadata);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized["camera-id"], "front");
        assert_eq!(normalized["zone"], "garden");
    }
}

//! Configuration models as defined in the TOML file.

use std::path::PathBuf;
use std::time::Duration;

use driftwatch_core::{Credentials, Subscription};
use serde::Deserialize;
use url::Url;

/// Top-level bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Object store connection settings.
    pub store: StoreSettings,
    /// Remote notification subscriptions.
    #[serde(default)]
    pub listen: Vec<ListenEntry>,
    /// Local filesystem watches.
    #[serde(default)]
    pub watch: Vec<WatchEntry>,
    /// Directories local files may be read from or written to.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
    /// Quiet period for local watch debouncing, in milliseconds.
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
}

impl Config {
    /// Debounce window as a duration.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

/// Object store connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Host name or address, without scheme.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use TLS when talking to the store.
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,
}

impl StoreSettings {
    /// Endpoint URL derived from host, port, and the TLS flag.
    pub fn endpoint_url(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}:{}", self.host, self.port))
    }

    /// Credentials for request signing.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.access_key.clone(), self.secret_key.clone())
    }
}

/// One remote notification subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenEntry {
    /// Bucket whose notification endpoint is subscribed.
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_events")]
    pub events: Vec<String>,
}

impl ListenEntry {
    /// The stream filter this entry describes.
    pub fn subscription(&self) -> Subscription {
        Subscription::new(
            self.bucket.clone(),
            self.prefix.clone(),
            self.suffix.clone(),
            self.events.iter().cloned(),
        )
    }
}

/// One local filesystem watch, mirroring the remote entry shape.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchEntry {
    /// Directory watched recursively.
    pub path: PathBuf,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_events")]
    pub events: Vec<String>,
}

impl WatchEntry {
    /// Glob equivalent of the prefix/suffix filter, matched against file
    /// names.
    pub fn pattern(&self) -> String {
        format!("{}*{}", self.prefix, self.suffix)
    }
}

fn default_debounce_window_ms() -> u64 {
    1000
}

fn default_port() -> u16 {
    9000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_suffix() -> String {
    ".*".to_string()
}

fn default_events() -> Vec<String> {
    vec!["s3:ObjectCreated:*".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_entry_converts_to_subscription() {
        let entry = ListenEntry {
            bucket: "camera".to_string(),
            prefix: "snaps/".to_string(),
            suffix: ".jpg".to_string(),
            events: vec![
                "s3:ObjectCreated:*".to_string(),
                "s3:ObjectCreated:*".to_string(),
            ],
        };

        let subscription = entry.subscription();
        assert_eq!(subscription.bucket, "camera");
        assert_eq!(subscription.events, vec!["s3:ObjectCreated:*"]);
    }

    #[test]
    fn watch_entry_pattern_combines_prefix_and_suffix() {
        let entry = WatchEntry {
            path: PathBuf::from("/data/export"),
            prefix: "report-".to_string(),
            suffix: ".csv".to_string(),
            events: default_events(),
        };
        assert_eq!(entry.pattern(), "report-*.csv");
    }

    #[test]
    fn secure_flag_selects_the_scheme() {
        let mut settings = StoreSettings {
            host: "store.local".to_string(),
            port: 9000,
            secure: false,
            access_key: String::new(),
            secret_key: String::new(),
            region: default_region(),
        };
        assert_eq!(
            settings.endpoint_url().unwrap().as_str(),
            "http://store.local:9000/"
        );

        settings.secure = true;
        assert_eq!(settings.endpoint_url().unwrap().scheme(), "https");
    }
}

//! Guard rails applied after loading.
//!
//! Hard errors stop the bridge from starting with a configuration that
//! cannot work; warnings surface suspicious-but-legal settings so the host
//! can log them.

use thiserror::Error;

use crate::models::Config;

/// Fatal configuration problems.
#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("store endpoint '{host}:{port}' is not a valid URL")]
    InvalidEndpoint {
        host: String,
        port: u16,
        #[source]
        source: url::ParseError,
    },
    #[error("listen entry {index} has an empty bucket")]
    EmptyBucket { index: usize },
    #[error("watch entry {index} has an empty path")]
    EmptyWatchPath { index: usize },
    #[error("allowed path '{path}' is not absolute")]
    RelativeAllowedPath { path: String },
    #[error(
        "store credentials are missing; set access_key/secret_key or the \
         DRIFTWATCH_ACCESS_KEY/DRIFTWATCH_SECRET_KEY environment variables"
    )]
    MissingCredentials,
}

/// One non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

/// Accumulated non-fatal findings.
#[derive(Debug, Default)]
pub struct ConfigWarnings {
    entries: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(&mut self, message: impl Into<String>, hint: impl Into<String>) {
        self.entries.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.entries.iter()
    }
}

/// Validate `config`, returning warnings for anything legal but suspect.
pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    config
        .store
        .endpoint_url()
        .map_err(|source| ConfigGuardRailError::InvalidEndpoint {
            host: config.store.host.clone(),
            port: config.store.port,
            source,
        })?;

    // Remote subscriptions need signing material; a purely local setup
    // does not.
    if !config.listen.is_empty()
        && (config.store.access_key.is_empty() || config.store.secret_key.is_empty())
    {
        return Err(ConfigGuardRailError::MissingCredentials);
    }

    for (index, entry) in config.listen.iter().enumerate() {
        if entry.bucket.is_empty() {
            return Err(ConfigGuardRailError::EmptyBucket { index });
        }
        warn_on_unusual_patterns(&mut warnings, &entry.bucket, &entry.events);
    }

    for (index, entry) in config.watch.iter().enumerate() {
        if entry.path.as_os_str().is_empty() {
            return Err(ConfigGuardRailError::EmptyWatchPath { index });
        }
        warn_on_unusual_patterns(
            &mut warnings,
            &entry.path.display().to_string(),
            &entry.events,
        );
    }

    for path in &config.allowed_paths {
        if !path.is_absolute() {
            return Err(ConfigGuardRailError::RelativeAllowedPath {
                path: path.display().to_string(),
            });
        }
    }

    if config.listen.is_empty() && config.watch.is_empty() {
        warnings.push_with_hint(
            "no listen or watch entries configured; the bridge has nothing to do",
            "add a [[listen]] or [[watch]] entry",
        );
    }

    if config.debounce_window_ms == 0 {
        warnings.push("debounce_window_ms is 0; every change fires immediately");
    }

    Ok(warnings)
}

fn warn_on_unusual_patterns(warnings: &mut ConfigWarnings, entry: &str, events: &[String]) {
    for pattern in events {
        if !pattern.starts_with("s3:") {
            warnings.push_with_hint(
                format!("event pattern '{pattern}' on '{entry}' does not look like a store event"),
                "patterns usually take the form s3:ObjectCreated:*",
            );
        }
    }
}

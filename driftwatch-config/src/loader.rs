//! Config loading with environment overrides.
//!
//! Credentials never have to live in the config file: the loader lets
//! `DRIFTWATCH_ACCESS_KEY` / `DRIFTWATCH_SECRET_KEY` (optionally supplied
//! through a `.env` file) override whatever the file carries.

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::models::Config;
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

/// Environment variable overriding `store.access_key`.
pub const ACCESS_KEY_ENV: &str = "DRIFTWATCH_ACCESS_KEY";
/// Environment variable overriding `store.secret_key`.
pub const SECRET_KEY_ENV: &str = "DRIFTWATCH_SECRET_KEY";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
}

/// A validated configuration plus any non-fatal findings.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

/// Loads a configuration file, applies environment overrides, and runs the
/// guard rails.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Load from `path` when [`load`](Self::load) is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read, override, and validate.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        // A `.env` next to the working directory participates in overrides
        // when present; a missing file is not an error.
        let _ = dotenvy::dotenv();

        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigLoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut config: Config =
            toml::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
                path: self.path.clone(),
                source,
            })?;

        apply_env_overrides(&mut config);
        let warnings = validation::apply_guard_rails(&config)?;

        Ok(ConfigLoad { config, warnings })
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var(ACCESS_KEY_ENV) {
        debug!("store access key overridden from {ACCESS_KEY_ENV}");
        config.store.access_key = value;
    }
    if let Ok(value) = std::env::var(SECRET_KEY_ENV) {
        debug!("store secret key overridden from {SECRET_KEY_ENV}");
        config.store.secret_key = value;
    }
}

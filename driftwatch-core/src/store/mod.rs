//! Object-store operations and the local path allowlist.
//!
//! Put/get/remove are boundary operations: the bridge's core never calls
//! them on its own, but hosts embedding the bridge do, and every local file
//! path must clear the allowlist before any store interaction happens.

use std::env;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use reqwest::{Method, Request};
use tokio::fs;
use tracing::debug;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{BridgeError, Result};

pub mod sign;

/// Access credentials for the object store. Secret material is zeroized on
/// drop and redacted from debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Public key identifier.
    pub access_key: String,
    /// Signing secret.
    pub secret_key: String,
}

impl Credentials {
    /// Wrap an access/secret key pair.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Directories local files may be read from or written to.
///
/// Paths are normalized lexically (absolutized against the working
/// directory, `.`/`..` components resolved) before the containment check,
/// so traversal cannot escape an allowed root.
#[derive(Debug, Clone, Default)]
pub struct PathAllowlist {
    dirs: Vec<PathBuf>,
}

impl PathAllowlist {
    /// Build an allowlist from directory roots.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().map(|dir| normalize(&dir)).collect(),
        }
    }

    /// Reject `path` unless it resolves under an allow-listed directory.
    pub fn check(&self, path: &Path) -> Result<()> {
        let resolved = normalize(path);
        if self.dirs.iter().any(|dir| resolved.starts_with(dir)) {
            Ok(())
        } else {
            Err(BridgeError::PathNotAllowed(path.display().to_string()))
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    clean
}

/// Client for the store's object operations.
#[derive(Debug, Clone)]
pub struct ObjectStoreClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
    region: String,
    allowlist: PathAllowlist,
}

impl ObjectStoreClient {
    /// Configure a client against `endpoint`. Local file arguments to
    /// [`put_object`](Self::put_object) and [`get_object`](Self::get_object)
    /// must clear `allowlist`.
    pub fn new(endpoint: Url, credentials: Credentials, allowlist: PathAllowlist) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            credentials,
            region: sign::DEFAULT_REGION.to_string(),
            allowlist,
        })
    }

    /// Override the signing region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Upload a local file as `bucket`/`key`. The file path is validated
    /// against the allowlist before the store is touched.
    pub async fn put_object(&self, file_path: &Path, bucket: &str, key: &str) -> Result<()> {
        self.allowlist.check(file_path)?;

        let bytes = fs::read(file_path).await?;
        let payload_hash = sign::payload_sha256(&bytes);

        let mut request = Request::new(Method::PUT, self.object_url(bucket, key));
        *request.body_mut() = Some(bytes.into());
        sign::sign_request(&mut request, &self.credentials, &self.region, &payload_hash)?;

        self.http.execute(request).await?.error_for_status()?;
        debug!(bucket, key, "object uploaded");
        Ok(())
    }

    /// Download `bucket`/`key` to a local file. The target path is
    /// validated against the allowlist before the store is touched.
    pub async fn get_object(&self, file_path: &Path, bucket: &str, key: &str) -> Result<()> {
        self.allowlist.check(file_path)?;

        let mut request = Request::new(Method::GET, self.object_url(bucket, key));
        sign::sign_request(
            &mut request,
            &self.credentials,
            &self.region,
            sign::EMPTY_PAYLOAD_SHA256,
        )?;

        let response = self.http.execute(request).await?.error_for_status()?;
        let bytes = response.bytes().await?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(file_path, &bytes).await?;
        debug!(bucket, key, "object downloaded");
        Ok(())
    }

    /// Delete `bucket`/`key` from the store.
    pub async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut request = Request::new(Method::DELETE, self.object_url(bucket, key));
        sign::sign_request(
            &mut request,
            &self.credentials,
            &self.region,
            sign::EMPTY_PAYLOAD_SHA256,
        )?;

        self.http.execute(request).await?.error_for_status()?;
        debug!(bucket, key, "object removed");
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(&format!(
            "/{}/{}",
            sign::uri_encode(bucket, true),
            sign::uri_encode(key, false)
        ));
        url.set_query(None);
        url
    }
}

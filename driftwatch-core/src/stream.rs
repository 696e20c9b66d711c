//! Long-lived notification stream reader.
//!
//! One task per subscription. The task owns its connection state: it opens
//! a signed streaming GET against the bucket notification endpoint, splits
//! the response body on newlines, and pushes decoded events into the
//! dispatch queue. Transient failures (malformed line, dropped socket) tear
//! the connection down and reconnect; an explicit close cancels the task at
//! its next suspension point and never reconnects. Records delivered before
//! a reconnect may be delivered again afterwards — consumers get
//! at-least-once, not exactly-once.

use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use reqwest::{Method, Request};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::decode::{Decoded, decode_line};
use crate::error::Result;
use crate::queue::DispatchQueue;
use crate::store::{Credentials, sign};

/// Filter describing which change records the remote stream delivers.
/// Immutable once a reader is started.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Bucket whose notification endpoint is subscribed.
    pub bucket: String,
    /// Only keys starting with this prefix are delivered.
    pub prefix: String,
    /// Only keys ending with this suffix are delivered.
    pub suffix: String,
    /// Event patterns, ordered and de-duplicated.
    pub events: Vec<String>,
}

impl Subscription {
    /// Build a subscription, de-duplicating `events` while preserving the
    /// order of first occurrence.
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        events: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut deduped: Vec<String> = Vec::new();
        for event in events {
            let event = event.into();
            if !deduped.contains(&event) {
                deduped.push(event);
            }
        }

        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            events: deduped,
        }
    }
}

/// Reconnect pacing: the delay doubles per consecutive failure up to `max`,
/// with full jitter, and resets after a healthy connection.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Ceiling for the doubled delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    fn delay(&self, failures: u32) -> Duration {
        let doubled = self
            .initial
            .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
            .min(self.max);
        let jitter = rand::rng().random_range(0..=doubled.as_millis() as u64 / 2);
        doubled + Duration::from_millis(jitter)
    }
}

/// Owns everything needed to (re)establish one notification stream.
#[derive(Debug, Clone)]
pub struct EventStreamReader {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
    region: String,
    subscription: Subscription,
    backoff: BackoffConfig,
}

impl EventStreamReader {
    /// Configure a reader for one subscription. Nothing connects until
    /// [`open`](Self::open).
    pub fn new(endpoint: Url, credentials: Credentials, subscription: Subscription) -> Result<Self> {
        // Connect timeout only: the body read must be allowed to idle
        // between events for as long as the stream stays up.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            region: sign::DEFAULT_REGION.to_string(),
            subscription,
            backoff: BackoffConfig::default(),
        })
    }

    /// Override the signing region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Override the reconnect pacing.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Spawn the reader task. Decoded events are pushed into `queue` until
    /// the returned handle is closed.
    pub fn open(self, queue: DispatchQueue) -> StreamReaderHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(run_reader(self, queue, token.clone()));
        StreamReaderHandle {
            token,
            task: Some(task),
        }
    }

    fn notification_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.set_path(&format!("/{}", sign::uri_encode(&self.subscription.bucket, true)));

        let mut pairs: Vec<(&str, &str)> = vec![
            ("prefix", self.subscription.prefix.as_str()),
            ("suffix", self.subscription.suffix.as_str()),
        ];
        for event in &self.subscription.events {
            pairs.push(("events", event.as_str()));
        }
        // The strictly-encoded, sorted form doubles as the canonical query,
        // so the wire bytes and the signature never drift apart.
        url.set_query(Some(&sign::canonical_query(&pairs)));
        Ok(url)
    }

    async fn connect(&self) -> Result<reqwest::Response> {
        let mut request = Request::new(Method::GET, self.notification_url()?);
        sign::sign_request(
            &mut request,
            &self.credentials,
            &self.region,
            sign::EMPTY_PAYLOAD_SHA256,
        )?;

        let response = self.client.execute(request).await?;
        Ok(response.error_for_status()?)
    }
}

/// Handle to a running stream reader. Dropping the handle cancels the
/// reader; [`close`](Self::close) additionally waits for the task to exit.
#[derive(Debug)]
pub struct StreamReaderHandle {
    token: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamReaderHandle {
    /// Stop producing events, abort any in-flight read at its suspension
    /// point, and wait for the reader task to exit. The reader never
    /// reconnects after this.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamReaderHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Why one connection epoch ended.
enum StreamEnd {
    /// The caller closed the reader; do not reconnect.
    Closed,
    /// A line failed to parse; reconnect immediately.
    Malformed,
    /// The socket dropped or the body ended; reconnect with backoff.
    Disconnected,
}

async fn run_reader(reader: EventStreamReader, queue: DispatchQueue, token: CancellationToken) {
    let bucket = reader.subscription.bucket.clone();
    let mut failures: u32 = 0;

    loop {
        if token.is_cancelled() {
            break;
        }

        match reader.connect().await {
            Ok(response) => {
                info!(%bucket, "connected to notification stream");
                failures = 0;
                match read_stream(response, &queue, &token).await {
                    StreamEnd::Closed => break,
                    // A bad line is transient: drop the connection and
                    // reopen without waiting.
                    StreamEnd::Malformed => continue,
                    StreamEnd::Disconnected => {}
                }
            }
            Err(err) => {
                warn!(%bucket, error = %err, "notification stream connect failed");
            }
        }

        failures = failures.saturating_add(1);
        let delay = reader.backoff.delay(failures);
        debug!(%bucket, failures, ?delay, "reconnecting notification stream");
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!(%bucket, "notification stream reader stopped");
}

async fn read_stream(
    response: reqwest::Response,
    queue: &DispatchQueue,
    token: &CancellationToken,
) -> StreamEnd {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => return StreamEnd::Closed,
            chunk = body.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                warn!(error = %err, "notification stream read failed");
                return StreamEnd::Disconnected;
            }
            None => {
                debug!("notification stream body ended");
                return StreamEnd::Disconnected;
            }
        };

        buffer.extend_from_slice(&chunk);
        while let Some(newline) = buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            match handle_line(&line[..newline], queue) {
                LineOutcome::Ok => {}
                LineOutcome::Malformed => return StreamEnd::Malformed,
            }
        }
    }
}

enum LineOutcome {
    Ok,
    Malformed,
}

fn handle_line(raw: &[u8], queue: &DispatchQueue) -> LineOutcome {
    let raw = raw.trim_ascii();
    if raw.is_empty() {
        // Blank lines keep the connection alive.
        trace!("keep-alive");
        return LineOutcome::Ok;
    }

    let Ok(line) = std::str::from_utf8(raw) else {
        warn!("notification line is not valid UTF-8");
        return LineOutcome::Malformed;
    };

    match decode_line(line) {
        Ok(Decoded::Events(events)) => {
            for event in events {
                queue.push(event);
            }
            LineOutcome::Ok
        }
        Ok(Decoded::KeepAlive) => {
            trace!("keep-alive");
            LineOutcome::Ok
        }
        Err(err) => {
            warn!(error = %err, "malformed notification line");
            LineOutcome::Malformed
        }
    }
}

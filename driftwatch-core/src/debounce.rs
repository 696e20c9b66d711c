//! Per-key debounce scheduling.
//!
//! A single loop task owns the pending-timer table; external callers hand
//! events in through a channel, so the table itself never crosses a task
//! boundary and needs no locking. A new event for a key with a live timer
//! replaces both the deadline and the payload; once a key has seen no
//! events for the configured timeout, the callback fires exactly once with
//! the latest payload. Distinct keys are fully independent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::debug;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

enum Command<T> {
    Schedule { key: String, payload: T },
    Stop,
}

struct PendingTimer<T> {
    deadline: Instant,
    payload: T,
}

/// Handle to a running debounce loop.
///
/// Callers must supply an explicit, stable key for the thing being
/// debounced (a canonical path, an object key) rather than relying on
/// payload equality.
pub struct DebounceScheduler<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    task: JoinHandle<()>,
}

impl<T> fmt::Debug for DebounceScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("loop_finished", &self.task.is_finished())
            .finish()
    }
}

impl<T: Send + 'static> DebounceScheduler<T> {
    /// Spawn the timer loop. `callback` runs on the loop task each time a
    /// key has seen no new events for `timeout`.
    pub fn start(timeout: Duration, callback: impl Fn(T) + Send + Sync + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loop(rx, timeout, Arc::new(callback)));
        Self { tx, task }
    }

    /// Reset the quiet period for `key`, replacing any stale payload.
    /// Safe to call from any task or thread while the scheduler runs.
    ///
    /// Panics if called after [`stop`](Self::stop) has torn the loop down;
    /// that is a caller lifecycle bug, not a recoverable condition.
    pub fn handle_event(&self, key: impl Into<String>, payload: T) {
        self.tx
            .send(Command::Schedule {
                key: key.into(),
                payload,
            })
            .expect("debounce scheduler used after stop");
    }

    /// A cloneable sender for producers living on other threads (e.g. OS
    /// watcher callbacks).
    pub fn handle(&self) -> DebounceHandle<T> {
        DebounceHandle {
            tx: self.tx.clone(),
        }
    }

    /// Halt the loop and join it. Timers still pending at that moment are
    /// discarded without firing.
    pub async fn stop(self) {
        let _ = self.tx.send(Command::Stop);
        let _ = self.task.await;
    }
}

/// Cloneable sender half of a [`DebounceScheduler`].
pub struct DebounceHandle<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for DebounceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for DebounceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceHandle").finish()
    }
}

impl<T: Send + 'static> DebounceHandle<T> {
    /// Same contract as [`DebounceScheduler::handle_event`], except that a
    /// stopped scheduler drops the event instead of panicking: detached
    /// producers may legitimately outlive the loop for a moment during
    /// shutdown.
    pub fn handle_event(&self, key: impl Into<String>, payload: T) {
        let _ = self.tx.send(Command::Schedule {
            key: key.into(),
            payload,
        });
    }
}

async fn run_loop<T>(
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    timeout: Duration,
    callback: Callback<T>,
) {
    let mut pending: HashMap<String, PendingTimer<T>> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|timer| timer.deadline).min();

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Schedule { key, payload }) => {
                    // Insertion replaces the previous timer for this key,
                    // which is the cancel-and-reschedule contract.
                    pending.insert(key, PendingTimer {
                        deadline: Instant::now() + timeout,
                        payload,
                    });
                }
                Some(Command::Stop) | None => break,
            },
            _ = wait_until(next_deadline) => {
                fire_due(&mut pending, &callback);
            }
        }
    }

    if !pending.is_empty() {
        debug!(
            discarded = pending.len(),
            "debounce loop stopped with pending timers"
        );
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn fire_due<T>(pending: &mut HashMap<String, PendingTimer<T>>, callback: &Callback<T>) {
    let now = Instant::now();
    let due: Vec<String> = pending
        .iter()
        .filter(|(_, timer)| timer.deadline <= now)
        .map(|(key, _)| key.clone())
        .collect();

    for key in due {
        if let Some(timer) = pending.remove(&key) {
            (callback)(timer.payload);
        }
    }
}

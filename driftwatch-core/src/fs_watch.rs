//! Filesystem watch pipeline.
//!
//! A thin wrapper around `notify` that funnels raw path-change
//! notifications from every watched root through one shared debounce
//! scheduler: repeated writes to the same file collapse into a single
//! callback fired after the quiet period, while unrelated files settle
//! independently.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::time::Duration;
use tracing::warn;

use crate::debounce::{DebounceHandle, DebounceScheduler};
use crate::error::{BridgeError, Result};

/// Configuration knobs for watch processing.
#[derive(Clone, Debug)]
pub struct WatchGroupConfig {
    /// Quiet period a path must stay unchanged before it is reported.
    pub debounce_window: Duration,
}

impl Default for WatchGroupConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(1),
        }
    }
}

/// A set of recursive path watches sharing one debounce scheduler.
///
/// The group callback receives the settled path once per quiet period.
pub struct WatchGroup {
    watchers: Vec<RecommendedWatcher>,
    scheduler: DebounceScheduler<PathBuf>,
}

impl fmt::Debug for WatchGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchGroup")
            .field("watcher_count", &self.watchers.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl WatchGroup {
    /// Create the group and start its shared scheduler immediately.
    pub fn new(
        config: WatchGroupConfig,
        callback: impl Fn(PathBuf) + Send + Sync + 'static,
    ) -> Self {
        Self {
            watchers: Vec::new(),
            scheduler: DebounceScheduler::start(config.debounce_window, callback),
        }
    }

    /// Watch `path` recursively. Changes to files whose name matches any of
    /// `patterns` (every file when empty) are debounced per path and
    /// reported through the group callback. Directory-only events are
    /// ignored.
    pub fn add(&mut self, path: &Path, patterns: &[String]) -> Result<()> {
        let matcher = build_matcher(patterns)?;
        let handle = self.scheduler.handle();
        let root = path.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => route_event(&handle, &matcher, event),
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "watch error");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|err| {
            BridgeError::Watch(format!("failed to create watcher for {}: {err}", path.display()))
        })?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|err| {
                BridgeError::Watch(format!("failed to watch {}: {err}", path.display()))
            })?;

        self.watchers.push(watcher);
        Ok(())
    }

    /// Number of active watches.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether the group has no watches yet.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Stop every child watch first, then the shared scheduler, so no watch
    /// can enqueue an event once pending timers start being discarded.
    pub async fn stop(self) {
        let WatchGroup {
            watchers,
            scheduler,
        } = self;
        drop(watchers);
        scheduler.stop().await;
    }
}

fn route_event(handle: &DebounceHandle<PathBuf>, matcher: &GlobSet, event: Event) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }

    for path in event.paths {
        // Best effort: by the time a removal is observed the entry is gone
        // and cannot be told apart from a directory.
        if path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        if !matcher.is_match(name) {
            continue;
        }

        let key = path.to_string_lossy().into_owned();
        handle.handle_event(key, path);
    }
}

fn build_matcher(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    if patterns.is_empty() {
        builder.add(glob("*")?);
    } else {
        for pattern in patterns {
            builder.add(glob(pattern)?);
        }
    }
    builder
        .build()
        .map_err(|err| BridgeError::Watch(err.to_string()))
}

fn glob(pattern: &str) -> Result<Glob> {
    Glob::new(pattern)
        .map_err(|err| BridgeError::Watch(format!("invalid pattern {pattern:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn group_with_recorder(
        window: Duration,
    ) -> (Arc<Mutex<Vec<PathBuf>>>, WatchGroup) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let group = WatchGroup::new(
            WatchGroupConfig {
                debounce_window: window,
            },
            move |path| sink.lock().unwrap().push(path),
        );
        (fired, group)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_writes_collapse_into_one_callback() {
        let tmp = tempdir().unwrap();
        let (fired, mut group) = group_with_recorder(Duration::from_millis(400));
        group.add(tmp.path(), &[]).unwrap();

        let file = tmp.path().join("burst");
        for i in 0..5 {
            std::fs::write(&file, format!("write {i}\n")).unwrap();
            sleep(Duration::from_millis(100)).await;
        }

        sleep(Duration::from_millis(1200)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1, "expected one settled callback, got {fired:?}");
        assert!(fired[0].ends_with("burst"));

        drop(fired);
        group.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn patterns_filter_by_file_name() {
        let tmp = tempdir().unwrap();
        let (fired, mut group) = group_with_recorder(Duration::from_millis(200));
        group.add(tmp.path(), &["*.txt".to_string()]).unwrap();

        std::fs::write(tmp.path().join("note.txt"), "hello").unwrap();
        std::fs::write(tmp.path().join("image.jpg"), "binary").unwrap();

        sleep(Duration::from_millis(800)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1, "expected only the txt file, got {fired:?}");
        assert!(fired[0].ends_with("note.txt"));

        drop(fired);
        group.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_before_deadline_discards_the_callback() {
        let tmp = tempdir().unwrap();
        let (fired, mut group) = group_with_recorder(Duration::from_millis(500));
        group.add(tmp.path(), &[]).unwrap();

        std::fs::write(tmp.path().join("late"), "unsettled").unwrap();
        // Give notify a moment to deliver, then stop inside the window.
        sleep(Duration::from_millis(100)).await;
        group.stop().await;

        sleep(Duration::from_millis(1000)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn distinct_files_settle_independently() {
        let tmp = tempdir().unwrap();
        let (fired, mut group) = group_with_recorder(Duration::from_millis(300));
        group.add(tmp.path(), &[]).unwrap();

        std::fs::write(tmp.path().join("one"), "1").unwrap();
        std::fs::write(tmp.path().join("two"), "2").unwrap();

        sleep(Duration::from_millis(1000)).await;

        let mut names: Vec<String> = fired
            .lock()
            .unwrap()
            .iter()
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        assert_eq!(names, vec!["one", "two"]);

        group.stop().await;
    }
}

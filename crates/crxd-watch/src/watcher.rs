//! Filesystem change watcher.
//!
//! Bridges notify's callback thread into a tokio channel and drives the
//! debounce loop that turns bursts of changes into single triggers.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::WatchError;
use crate::debouncer::Debouncer;
use crate::filter::PathFilter;

/// Capacity of the buffer between notify's thread and the debounce loop.
const EVENT_BUFFER: usize = 100;

/// Watches a project root for qualifying modifications.
pub struct ChangeWatcher {
    root: PathBuf,
    filter: PathFilter,
    watcher: Option<RecommendedWatcher>,
    watched: Vec<PathBuf>,
}

impl ChangeWatcher {
    /// Create a watcher for `root`. Nothing is observed until [`start`](Self::start).
    #[must_use]
    pub fn new(root: PathBuf, filter: PathFilter) -> Self {
        Self {
            root,
            filter,
            watcher: None,
            watched: Vec::new(),
        }
    }

    /// Directories registered with the platform watcher by [`start`](Self::start).
    #[must_use]
    pub fn watched_roots(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Start observing. Only changes made after this call are reported.
    ///
    /// Each qualifying path is sent on the returned channel. The channel
    /// closes when the watcher is dropped.
    ///
    /// Only the filter's [watch roots](PathFilter::watch_roots) that exist are
    /// registered, so dependency and output trees beside them are never
    /// walked.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be resolved or watched.
    pub fn start(&mut self) -> Result<mpsc::Receiver<PathBuf>, WatchError> {
        // notify reports canonical paths on some platforms.
        let root = self.root.canonicalize().map_err(|source| WatchError::Root {
            path: self.root.clone(),
            source,
        })?;
        let filter = self.filter.clone();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "File watcher error");
                    return;
                }
            };
            for path in qualifying_paths(&event, &watch_root, &filter) {
                // Callback runs on notify's thread, outside the runtime.
                if tx.blocking_send(path).is_err() {
                    return;
                }
            }
        })?;

        let mut watched = Vec::new();
        for relative in self.filter.watch_roots() {
            let dir = if relative.as_os_str().is_empty() {
                root.clone()
            } else {
                root.join(relative)
            };
            if !dir.is_dir() {
                tracing::warn!(path = %dir.display(), "Watch directory does not exist, skipping");
                continue;
            }
            watcher.watch(&dir, RecursiveMode::Recursive)?;
            tracing::debug!(path = %dir.display(), "Registered watch directory");
            watched.push(dir);
        }
        self.watcher = Some(watcher);
        self.watched = watched;
        tracing::info!(root = %root.display(), dirs = self.watched.len(), "Watching for changes");

        Ok(rx)
    }
}

/// Paths of `event` that count as source modifications.
fn qualifying_paths(event: &Event, root: &Path, filter: &PathFilter) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Modify(_)) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| {
            path.strip_prefix(root)
                .is_ok_and(|relative| filter.matches(relative))
        })
        .cloned()
        .collect()
}

/// Run `on_fire` once per quiet window closed after a burst of events.
///
/// Every event re-arms a single deadline `window` in the future; when the
/// deadline passes untouched, `on_fire` is awaited before the loop resumes.
/// Events arriving during `on_fire` are buffered and open a new window. The
/// loop ends when the event channel closes; a pending trigger is dropped.
pub async fn run_debounced<F, Fut>(
    mut events: mpsc::Receiver<PathBuf>,
    window: Duration,
    mut on_fire: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut debouncer = Debouncer::new(window);

    loop {
        let deadline = debouncer.next_deadline();

        tokio::select! {
            event = events.recv() => {
                let Some(path) = event else { break };
                tracing::info!(path = %path.display(), "File changed");
                debouncer.record(Instant::now());
            }
            () = sleep_until(deadline) => {
                if debouncer.take_ready(Instant::now()) {
                    on_fire().await;
                }
            }
        }
    }
}

/// Sleep until `deadline`, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

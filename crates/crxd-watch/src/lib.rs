//! Debounced filesystem change watcher for crxd.
//!
//! [`ChangeWatcher`] observes a project root with notify and forwards every
//! modification that passes the [`PathFilter`]. [`run_debounced`] turns that
//! stream into single triggers, one per quiet window.
//!
//! ```ignore
//! let filter = PathFilter::new(&include, &exclude, "dist")?;
//! let mut watcher = ChangeWatcher::new(root, filter);
//! let events = watcher.start()?;
//! run_debounced(events, Duration::from_millis(1000), || async {
//!     rebuild_and_notify().await;
//! })
//! .await;
//! ```

mod debouncer;
mod filter;
mod watcher;

use std::path::PathBuf;

pub use debouncer::Debouncer;
pub use filter::PathFilter;
pub use watcher::{ChangeWatcher, run_debounced};

/// Watcher error.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// A glob pattern failed to compile.
    #[error("Invalid watch pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// The watch root does not exist or cannot be resolved.
    #[error("Cannot watch {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The platform watcher failed.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

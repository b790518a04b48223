//! Error types for the watch subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur while watching a directory tree.
///
/// Only `Seed` and the passthrough construction errors are fatal to the
/// caller. `Watch` and `Classify` are per-path failures: the loop logs them
/// and keeps running.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Root path invalid or unreadable at watch start.
    #[error("failed to seed watch root {}: {reason}", .path.display())]
    Seed { path: PathBuf, reason: String },

    /// Registering or releasing a single directory's watch failed.
    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Stat or path resolution failed for a reason other than "not found".
    #[error("failed to classify event for {}: {source}", .path.display())]
    Classify {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

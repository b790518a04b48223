//! The injected OS notification primitive.
//!
//! The watch tree and control loop are written against [`WatchBackend`] so
//! the OS layer can be substituted across platforms and in tests. The
//! production backend wraps the `notify` crate with one non-recursive watch
//! per directory; recursion is the tree's job, not the OS layer's.

use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::classify::{RawEvent, split_event};
use crate::error::{Result, WatcherError};

/// Capability to register and release per-directory watches.
///
/// Notification and advisory-error delivery happen out of band, over the
/// channels handed out by the backend constructor.
pub trait WatchBackend: Send {
    /// Register a watch on a single directory.
    fn add_watch(&mut self, path: &Path) -> Result<()>;

    /// Release the watch on a single directory.
    fn remove_watch(&mut self, path: &Path) -> Result<()>;
}

/// Production backend over `notify`'s recommended platform watcher.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Build the backend together with its notification and advisory-error
    /// streams.
    ///
    /// Raw events are pushed with `blocking_send`: when the control loop
    /// lags, the OS callback thread waits rather than dropping events.
    /// Advisory errors are pushed with `try_send` and may be shed under
    /// pressure, since they are informational.
    pub fn new(
        event_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<RawEvent>, mpsc::Receiver<notify::Error>)> {
        // A zero capacity is treated as one: the channels must be usable.
        let capacity = event_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);

        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for raw in split_event(&event) {
                        if event_tx.blocking_send(raw).is_err() {
                            // Loop is gone; shutdown in progress.
                            return;
                        }
                    }
                }
                Err(err) => {
                    if error_tx.try_send(err).is_err() {
                        warn!("advisory error channel full or closed");
                    }
                }
            },
        )?;

        Ok((Self { watcher }, event_rx, error_rx))
    }
}

impl WatchBackend for NotifyBackend {
    fn add_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Watch {
                path: path.to_path_buf(),
                source,
            })
    }

    fn remove_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .unwatch(path)
            .map_err(|source| WatcherError::Watch {
                path: path.to_path_buf(),
                source,
            })
    }
}

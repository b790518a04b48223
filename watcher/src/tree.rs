//! The registry of per-directory watches.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::backend::WatchBackend;
use crate::error::{Result, WatcherError};

/// Owns the set of directories currently holding an OS-level watch.
///
/// The tree is the exclusive owner of watch handles: nothing else registers
/// or releases watches. Mutation happens only on the control loop; outside
/// readers take a [`snapshot`](WatchTree::snapshot).
pub struct WatchTree<B> {
    backend: B,
    watched: BTreeSet<PathBuf>,
}

impl<B: WatchBackend> WatchTree<B> {
    /// Create an empty tree over a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            watched: BTreeSet::new(),
        }
    }

    /// Register the root and walk its subtree, registering a watch on every
    /// directory found. Regular files are covered by their containing
    /// directory's watch.
    ///
    /// Fails with [`WatcherError::Seed`] if the root is missing, unreadable
    /// or not a directory, or if the root's own watch cannot be registered.
    /// Failures on nested directories are logged and skipped: one unreadable
    /// subdirectory must not abort watching the rest of the tree.
    pub fn seed(&mut self, root: &Path) -> Result<()> {
        let root = root
            .absolutize()
            .map_err(|err| seed_error(root, &err))?
            .into_owned();
        let meta = std::fs::metadata(&root).map_err(|err| seed_error(&root, &err))?;
        if !meta.is_dir() {
            return Err(WatcherError::Seed {
                path: root,
                reason: "not a directory".to_string(),
            });
        }

        self.add(&root).map_err(|err| seed_error(&root, &err))?;

        for entry in WalkDir::new(&root).min_depth(1) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => {
                    if let Err(err) = self.add(entry.path()) {
                        warn!("skipping unwatchable directory: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {err}", root.display());
                }
            }
        }

        debug!(
            "seeded {} with {} watched directories",
            root.display(),
            self.watched.len()
        );
        Ok(())
    }

    /// Register a watch on `path` if not already present. Adding an
    /// already-watched path is a no-op.
    ///
    /// A backend rejection (permission denied, or the directory vanished
    /// between detection and registration) surfaces as
    /// [`WatcherError::Watch`]; callers treat it as non-fatal.
    pub fn add(&mut self, path: &Path) -> Result<()> {
        if self.watched.contains(path) {
            return Ok(());
        }
        self.backend.add_watch(path)?;
        self.watched.insert(path.to_path_buf());
        debug!("watching {}", path.display());
        Ok(())
    }

    /// Release the watch on `path` and on every registered descendant.
    ///
    /// The OS layer does not cascade cleanup when a directory tree is
    /// deleted, so descendants are matched here on component boundaries.
    /// Removing a path with no registered watch is a no-op. Backend unwatch
    /// failures are expected (the OS usually dropped the watch together with
    /// the directory) and only logged.
    pub fn remove(&mut self, path: &Path) -> Result<()> {
        let victims: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|watched| watched.starts_with(path))
            .cloned()
            .collect();

        for victim in victims {
            if let Err(err) = self.backend.remove_watch(&victim) {
                debug!("unwatch {} failed (already gone?): {err}", victim.display());
            }
            self.watched.remove(&victim);
            debug!("unwatched {}", victim.display());
        }
        Ok(())
    }

    /// Whether `path` currently holds a watch.
    pub fn contains(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    /// Number of watched directories.
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    /// Whether no directory is watched.
    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Owned copy of the watch set, for diagnostics outside the loop.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.watched.iter().cloned().collect()
    }

    /// Release every watch and the backend itself.
    ///
    /// Dropping the tree also releases the OS resource via the backend's
    /// `Drop`; `close` additionally unwatches each path cleanly.
    pub fn close(mut self) {
        let paths: Vec<PathBuf> = self.watched.iter().cloned().collect();
        for path in paths {
            if let Err(err) = self.backend.remove_watch(&path) {
                debug!("unwatch {} on close failed: {err}", path.display());
            }
        }
        self.watched.clear();
    }
}

fn seed_error(path: &Path, err: &dyn std::fmt::Display) -> WatcherError {
    WatcherError::Seed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

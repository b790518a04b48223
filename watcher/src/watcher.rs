//! Session assembly: backend, tree, seed walk and loop wiring.

use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::NotifyBackend;
use crate::config::WatcherConfig;
use crate::error::Result;
use crate::record::ChangeRecord;
use crate::sink::RecordSink;
use crate::tree::WatchTree;
use crate::watch_loop::WatchLoop;

/// A running watch over one root directory.
///
/// [`WatchSession::start`] seeds the whole tree before the control loop is
/// spawned: notifications arriving during the walk buffer in the backend
/// channel, so events for directories that appear mid-walk are not consumed
/// before their parents are watched. Sessions are independent; multiple
/// roots or test instances can coexist.
#[derive(Debug)]
pub struct WatchSession {
    records: mpsc::Receiver<ChangeRecord>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl WatchSession {
    /// Seed `root` and spawn the control loop. Must be called within a tokio
    /// runtime. Fails only on backend construction or seed errors; the
    /// caller decides whether that terminates the process.
    pub fn start(root: &Path, config: &WatcherConfig) -> Result<Self> {
        let (backend, events, errors) = NotifyBackend::new(config.event_capacity)?;
        let mut tree = WatchTree::new(backend);
        tree.seed(root)?;
        info!(
            "watching {} ({} directories)",
            root.display(),
            tree.len()
        );

        let (sink, records) = RecordSink::bounded(config.queue_depth, config.overflow);
        let shutdown = CancellationToken::new();
        let watch_loop = WatchLoop::new(tree, events, errors, sink, shutdown.clone());
        let handle = tokio::spawn(watch_loop.run());

        Ok(Self {
            records,
            shutdown,
            handle,
        })
    }

    /// Receive the next change record. `None` once the loop has stopped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<ChangeRecord> {
        self.records.recv().await
    }

    /// Signal the loop to stop without waiting for it.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Signal the loop to stop and wait until every watch is released.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

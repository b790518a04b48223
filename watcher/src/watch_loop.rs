//! The control loop: pull, classify, forward, maintain the watch set.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::WatchBackend;
use crate::classify::{RawEvent, classify};
use crate::sink::{DeliverOutcome, RecordSink};
use crate::tree::WatchTree;

/// The single sequential task that owns watch-set mutation and event
/// classification.
///
/// Serialization is intentional: it rules out concurrent watch-set races and
/// keeps the add-before-miss ordering easy to reason about. Stat and watch
/// registration calls run synchronously inside the loop; the downstream
/// hand-off is bounded (see [`RecordSink`]) so a consumer can never be the
/// reason the loop hangs without that being the configured policy.
pub struct WatchLoop<B> {
    tree: WatchTree<B>,
    events: mpsc::Receiver<RawEvent>,
    errors: mpsc::Receiver<notify::Error>,
    sink: RecordSink,
    shutdown: CancellationToken,
}

impl<B: WatchBackend> WatchLoop<B> {
    /// Assemble a loop over an already-seeded tree and its backend streams.
    pub fn new(
        tree: WatchTree<B>,
        events: mpsc::Receiver<RawEvent>,
        errors: mpsc::Receiver<notify::Error>,
        sink: RecordSink,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tree,
            events,
            errors,
            sink,
            shutdown,
        }
    }

    /// Run until the notification stream closes, the consumer goes away or
    /// shutdown is signaled. Releases every watch on the way out, on all
    /// exit paths.
    pub async fn run(mut self) {
        info!("watch loop running");
        let mut errors_open = true;
        loop {
            tokio::select! {
                // Shutdown wins over draining further events.
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("watch loop shutdown signaled");
                    break;
                }

                maybe_raw = self.events.recv() => match maybe_raw {
                    Some(raw) => {
                        if !self.handle_event(raw).await {
                            break;
                        }
                    }
                    None => {
                        info!("notification stream closed");
                        break;
                    }
                },

                maybe_err = self.errors.recv(), if errors_open => match maybe_err {
                    // Backend errors are advisory (queue overflow warnings
                    // and the like), never terminal.
                    Some(err) => warn!("notification backend error: {err}"),
                    None => errors_open = false,
                },
            }
        }
        self.tree.close();
        info!("watch loop stopped");
    }

    /// Classify one raw event, forward the record, then apply the
    /// directory-lifecycle side effects. Returns false when the loop should
    /// stop (consumer gone).
    async fn handle_event(&mut self, raw: RawEvent) -> bool {
        let record = match classify(&raw) {
            Ok(Some(record)) => record,
            Ok(None) => return true,
            Err(err) => {
                warn!("dropping unclassifiable event: {err}");
                return true;
            }
        };

        debug!("classified {record}");
        let path = record.path.clone();
        let directory_created = record.is_directory_created();
        let removed = record.is_removed();

        if self.sink.deliver(record).await == DeliverOutcome::Closed {
            info!("record sink closed");
            return false;
        }

        if directory_created {
            // Register before anything inside the new directory can fire.
            if let Err(err) = self.tree.add(&path) {
                warn!("could not watch new directory: {err}");
            }
        } else if removed && self.tree.contains(&path) {
            // Post-removal the record carries no kind hint; the registered
            // watch entry is what tells us this used to be a directory.
            if let Err(err) = self.tree.remove(&path) {
                warn!("could not release watches under {}: {err}", path.display());
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::record::{ChangeOp, ChangeOps, ChangeRecord, PathKind};
    use crate::sink::OverflowPolicy;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::Sender;
    use tokio::task::JoinHandle;

    struct Harness {
        backend: MockBackend,
        events: Sender<RawEvent>,
        errors: Sender<notify::Error>,
        records: mpsc::Receiver<ChangeRecord>,
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
    }

    fn spawn_loop(seed: &[&Path]) -> Harness {
        let backend = MockBackend::new();
        let mut tree = WatchTree::new(backend.clone());
        for path in seed {
            tree.add(path).unwrap();
        }
        let (events_tx, events_rx) = mpsc::channel(32);
        let (errors_tx, errors_rx) = mpsc::channel(32);
        let (sink, records) = RecordSink::bounded(32, OverflowPolicy::Block);
        let shutdown = CancellationToken::new();
        let watch_loop = WatchLoop::new(tree, events_rx, errors_rx, sink, shutdown.clone());
        let handle = tokio::spawn(watch_loop.run());
        Harness {
            backend,
            events: events_tx,
            errors: errors_tx,
            records,
            shutdown,
            handle,
        }
    }

    async fn recv(records: &mut mpsc::Receiver<ChangeRecord>) -> ChangeRecord {
        tokio::time::timeout(Duration::from_secs(5), records.recv())
            .await
            .expect("timed out waiting for record")
            .expect("record stream ended")
    }

    fn raw(path: impl Into<PathBuf>, ops: &[ChangeOp]) -> RawEvent {
        RawEvent::new(path, ChangeOps::of(ops))
    }

    #[tokio::test]
    async fn test_directory_create_registers_watch_then_files_flow() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut h = spawn_loop(&[&root]);

        let sub = root.join("b");
        fs::create_dir(&sub).unwrap();
        h.events
            .send(raw(&sub, &[ChangeOp::Created]))
            .await
            .unwrap();

        let record = recv(&mut h.records).await;
        assert_eq!(record.kind, PathKind::Directory);
        assert!(record.ops.contains(ChangeOp::Created));
        assert_eq!(record.path, sub);

        // The file inside the new directory is observable only because the
        // watch on `b` was registered when its creation was classified.
        let file = sub.join("y.txt");
        fs::write(&file, "y").unwrap();
        h.events
            .send(raw(&file, &[ChangeOp::Created]))
            .await
            .unwrap();

        let record = recv(&mut h.records).await;
        assert_eq!(record.kind, PathKind::RegularFile);
        assert_eq!(record.path, file);
        assert!(h.backend.added().contains(&sub));

        h.shutdown.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_removed_directory_cascades_unwatch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let sub = root.join("b");
        let deep = sub.join("deep");
        let mut h = spawn_loop(&[&root, &sub, &deep]);

        h.events
            .send(raw(&sub, &[ChangeOp::Removed]))
            .await
            .unwrap();

        let record = recv(&mut h.records).await;
        assert_eq!(record.kind, PathKind::Removed);
        assert!(record.metadata.is_none());

        h.shutdown.cancel();
        h.handle.await.unwrap();

        // The directory and its registered descendant were released when the
        // removal was processed; the root only at close.
        assert_eq!(h.backend.removed(), vec![sub, deep, root]);
    }

    #[tokio::test]
    async fn test_file_removal_does_not_touch_watch_set() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut h = spawn_loop(&[&root]);

        h.events
            .send(raw(root.join("plain.txt"), &[ChangeOp::Removed]))
            .await
            .unwrap();

        let record = recv(&mut h.records).await;
        assert_eq!(record.kind, PathKind::Removed);

        h.shutdown.cancel();
        h.handle.await.unwrap();

        // Removal of an unwatched path must not trigger any unwatch before
        // close (close itself releases the root).
        assert_eq!(h.backend.removed(), vec![root]);
    }

    #[tokio::test]
    async fn test_advisory_errors_do_not_stop_the_loop() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut h = spawn_loop(&[&root]);

        h.errors
            .send(notify::Error::generic("queue overflow"))
            .await
            .unwrap();

        let file = root.join("after-error.txt");
        fs::write(&file, "x").unwrap();
        h.events
            .send(raw(&file, &[ChangeOp::Created]))
            .await
            .unwrap();

        let record = recv(&mut h.records).await;
        assert_eq!(record.path, file);

        h.shutdown.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_records_preserve_delivery_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut h = spawn_loop(&[&root]);

        let mut expected = Vec::new();
        for name in ["one.txt", "two.txt", "three.txt"] {
            let file = root.join(name);
            fs::write(&file, name).unwrap();
            h.events
                .send(raw(&file, &[ChangeOp::Created]))
                .await
                .unwrap();
            expected.push(file);
        }

        for path in expected {
            assert_eq!(recv(&mut h.records).await.path, path);
        }

        h.shutdown.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_closure_stops_and_closes_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let h = spawn_loop(&[&root]);

        drop(h.events);
        h.handle.await.unwrap();

        // close() released the seeded root watch.
        assert_eq!(h.backend.removed(), vec![root]);
    }

    #[tokio::test]
    async fn test_closed_sink_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut h = spawn_loop(&[&root]);

        h.records.close();
        let file = root.join("unwanted.txt");
        fs::write(&file, "x").unwrap();
        h.events
            .send(raw(&file, &[ChangeOp::Created]))
            .await
            .unwrap();

        h.handle.await.unwrap();
    }
}

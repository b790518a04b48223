//! End-to-end tests of a watch session over a real filesystem backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirsync_watcher::{ChangeOp, ChangeRecord, PathKind, WatchSession, WatcherConfig, WatcherError};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

/// Wait until a record matching `pred` arrives, collecting along the way.
async fn wait_for(
    session: &mut WatchSession,
    pred: impl Fn(&ChangeRecord) -> bool,
) -> ChangeRecord {
    timeout(Duration::from_secs(10), async {
        loop {
            let record = session.recv().await.expect("record stream ended early");
            if pred(&record) {
                return record;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching record")
}

fn is_kind(record: &ChangeRecord, path: &Path, kind: PathKind) -> bool {
    record.path == path && record.kind == kind
}

#[tokio::test]
async fn test_watch_session_end_to_end() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let sub = root.join("a");
    fs::create_dir(&sub).unwrap();

    let mut session = WatchSession::start(&root, &WatcherConfig::default()).unwrap();
    // Let the backend settle before mutating the tree.
    sleep(Duration::from_millis(200)).await;

    // A file inside a pre-seeded subdirectory is observed.
    let seeded_file = sub.join("x.txt");
    fs::write(&seeded_file, "x").unwrap();
    let record = wait_for(&mut session, |r| {
        is_kind(r, &seeded_file, PathKind::RegularFile)
    })
    .await;
    assert!(record.ops.contains(ChangeOp::Created) || record.ops.contains(ChangeOp::Written));
    assert!(record.metadata.is_some());

    // A directory created while running is classified and watched.
    let created_dir = root.join("b");
    fs::create_dir(&created_dir).unwrap();
    let record = wait_for(&mut session, |r| {
        is_kind(r, &created_dir, PathKind::Directory)
    })
    .await;
    assert!(record.ops.contains(ChangeOp::Created));

    // Give the loop a beat so the new watch is live, then prove
    // no-miss-on-create: a file strictly inside the new directory shows up.
    sleep(Duration::from_millis(300)).await;
    let inner_file = created_dir.join("y.txt");
    fs::write(&inner_file, "y").unwrap();
    let record = wait_for(&mut session, |r| {
        is_kind(r, &inner_file, PathKind::RegularFile)
    })
    .await;
    assert!(record.metadata.is_some());

    // Removing the (non-empty) directory yields a terminal removed record
    // with no metadata.
    fs::remove_dir_all(&created_dir).unwrap();
    let record = wait_for(&mut session, |r| r.path == created_dir && r.is_removed()).await;
    assert!(record.metadata.is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn test_start_rejects_missing_root() {
    let err = WatchSession::start(
        &PathBuf::from("/no/such/dirsync/root"),
        &WatcherConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, WatcherError::Seed { .. }));
}

#[tokio::test]
async fn test_start_rejects_file_root() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    let err = WatchSession::start(&file, &WatcherConfig::default()).unwrap_err();
    assert!(matches!(err, WatcherError::Seed { .. }));
}

#[tokio::test]
async fn test_zero_capacities_are_usable() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let sub = root.join("a");
    fs::create_dir(&sub).unwrap();

    // Zero-sized queues are clamped, not rejected; the session still flows.
    let config = WatcherConfig::default()
        .with_event_capacity(0)
        .with_queue_depth(0);
    let mut session = WatchSession::start(&root, &config).unwrap();
    sleep(Duration::from_millis(200)).await;

    let file = sub.join("x.txt");
    fs::write(&file, "x").unwrap();
    let record = wait_for(&mut session, |r| {
        is_kind(r, &file, PathKind::RegularFile)
    })
    .await;
    assert!(record.metadata.is_some());

    session.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_the_stream() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();

    let mut session = WatchSession::start(&root, &WatcherConfig::default()).unwrap();
    session.stop();

    // Once the loop exits the record stream drains to None.
    let drained = timeout(Duration::from_secs(5), async {
        while session.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
}

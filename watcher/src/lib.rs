//! # dirsync watcher
//!
//! Recursive watch management and event classification for the dirsync
//! client. The crate keeps the set of per-directory OS watches consistent
//! with a live directory tree and turns raw, multi-flagged platform
//! notifications into normalized [`ChangeRecord`]s for the downstream
//! synchronization pipeline.
//!
//! ## Architecture
//!
//! ```text
//! seed walk ──► WatchTree ◄── lifecycle side effects
//!                  │                    ▲
//!   OS primitive ──┴─► raw events ─► WatchLoop ─► classify ─► RecordSink
//! ```
//!
//! The tree owns the OS watch handles exclusively; the loop is the single
//! task that mutates it. Everything race-prone (a path vanishing between
//! notification and inspection) is resolved once, inside the classifier.

pub mod backend;
pub mod classify;
pub mod config;
pub mod error;
pub mod record;
pub mod sink;
pub mod tree;
pub mod watch_loop;
pub mod watcher;

pub use backend::{NotifyBackend, WatchBackend};
pub use classify::{RawEvent, classify, split_event};
pub use config::WatcherConfig;
pub use error::{Result, WatcherError};
pub use record::{ChangeOp, ChangeOps, ChangeRecord, FileMetadata, PathKind};
pub use sink::{DeliverOutcome, OverflowPolicy, RecordSink};
pub use tree::WatchTree;
pub use watch_loop::WatchLoop;
pub use watcher::WatchSession;

//! Classification of raw notifications into [`ChangeRecord`]s.
//!
//! The classifier is the single place where the race between event delivery
//! and filesystem inspection is resolved: a path that is absent by the time
//! we look at it is evidence of a removal, never an error.

use std::path::PathBuf;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use path_absolutize::Absolutize;

use crate::error::{Result, WatcherError};
use crate::record::{ChangeOp, ChangeOps, ChangeRecord, FileMetadata, PathKind};

/// One raw notification for one path, as handed over by the backend.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Path the notification refers to.
    pub path: PathBuf,

    /// Operations reported by the OS primitive.
    pub ops: ChangeOps,
}

impl RawEvent {
    /// Create a raw event.
    pub fn new(path: impl Into<PathBuf>, ops: ChangeOps) -> Self {
        Self {
            path: path.into(),
            ops,
        }
    }
}

/// Flatten a notify event into per-path raw events.
///
/// A rename with both endpoints becomes two raw events: the source path
/// carries `remove|rename` and the destination carries `create`, matching
/// the one-event-per-change contract downstream.
pub fn split_event(event: &notify::Event) -> Vec<RawEvent> {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if event.paths.len() >= 2 {
            let mut raw = vec![RawEvent::new(
                event.paths[0].clone(),
                ChangeOps::of(&[ChangeOp::Removed, ChangeOp::Renamed]),
            )];
            raw.extend(
                event.paths[1..]
                    .iter()
                    .map(|p| RawEvent::new(p.clone(), ChangeOps::of(&[ChangeOp::Created]))),
            );
            return raw;
        }
    }

    let ops = ops_for_kind(event.kind);
    event
        .paths
        .iter()
        .map(|p| RawEvent::new(p.clone(), ops))
        .collect()
}

/// Map a notify event kind to the operation set used downstream.
fn ops_for_kind(kind: EventKind) -> ChangeOps {
    match kind {
        EventKind::Create(_) => ChangeOps::of(&[ChangeOp::Created]),
        EventKind::Remove(_) => ChangeOps::of(&[ChangeOp::Removed]),
        EventKind::Modify(modify) => match modify {
            ModifyKind::Metadata(_) => ChangeOps::of(&[ChangeOp::PermissionsChanged]),
            ModifyKind::Name(RenameMode::From) => {
                ChangeOps::of(&[ChangeOp::Removed, ChangeOp::Renamed])
            }
            ModifyKind::Name(RenameMode::To) => ChangeOps::of(&[ChangeOp::Created]),
            ModifyKind::Name(_) => ChangeOps::of(&[ChangeOp::Renamed]),
            _ => ChangeOps::of(&[ChangeOp::Written]),
        },
        // Access and unknown kinds produce no record.
        _ => ChangeOps::empty(),
    }
}

/// Classify one raw event into zero or one [`ChangeRecord`].
///
/// The removal rule is decided here, once, from the raw operation flags: a
/// `remove` or `rename` flag means the record is a removal regardless of
/// whether the path happens to exist again. Re-stating a just-removed path
/// can return a different object's metadata and silently corrupt the record.
///
/// Only path-resolution failures and non-`NotFound` stat errors surface as
/// [`WatcherError::Classify`]; callers log those and keep the loop running.
pub fn classify(raw: &RawEvent) -> Result<Option<ChangeRecord>> {
    if raw.ops.is_empty() {
        return Ok(None);
    }

    let path = raw
        .path
        .absolutize()
        .map_err(|source| WatcherError::Classify {
            path: raw.path.clone(),
            source,
        })?
        .into_owned();

    if raw.ops.contains(ChangeOp::Removed) || raw.ops.contains(ChangeOp::Renamed) {
        return Ok(Some(ChangeRecord::removed(path, raw.ops)));
    }

    match std::fs::symlink_metadata(&path) {
        Ok(meta) => {
            let kind = if meta.is_dir() {
                PathKind::Directory
            } else {
                PathKind::RegularFile
            };
            let metadata = FileMetadata::from_fs(&meta);
            Ok(Some(ChangeRecord::observed(path, kind, raw.ops, metadata)))
        }
        // The object vanished between notification and inspection. Absence
        // at classification time is evidence of a removal, not a failure.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(Some(ChangeRecord::removed(path, raw.ops)))
        }
        Err(source) => Err(WatcherError::Classify { path, source }),
    }
}

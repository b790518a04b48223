//! Normalized change records produced by event classification.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single operation reported by the notification primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Path was created.
    Created,

    /// File contents were written.
    Written,

    /// Path was removed.
    Removed,

    /// Path was renamed away.
    Renamed,

    /// Permissions or other metadata changed.
    PermissionsChanged,
}

impl ChangeOp {
    const ALL: [ChangeOp; 5] = [
        ChangeOp::Created,
        ChangeOp::Written,
        ChangeOp::Removed,
        ChangeOp::Renamed,
        ChangeOp::PermissionsChanged,
    ];

    fn label(self) -> &'static str {
        match self {
            ChangeOp::Created => "create",
            ChangeOp::Written => "write",
            ChangeOp::Removed => "remove",
            ChangeOp::Renamed => "rename",
            ChangeOp::PermissionsChanged => "chmod",
        }
    }
}

/// The set of operations carried by one raw notification.
///
/// A single notification can combine operations (a write together with a
/// permission change, for example), so consumers must treat the whole set
/// as authoritative rather than collapsing it to one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOps {
    /// Path was created.
    pub created: bool,

    /// File contents were written.
    pub written: bool,

    /// Path was removed.
    pub removed: bool,

    /// Path was renamed away.
    pub renamed: bool,

    /// Permissions or other metadata changed.
    pub permissions_changed: bool,
}

impl ChangeOps {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from individual operations.
    pub fn of(ops: &[ChangeOp]) -> Self {
        ops.iter().fold(Self::empty(), |set, op| set.with(*op))
    }

    /// Return the set with `op` added.
    pub fn with(mut self, op: ChangeOp) -> Self {
        match op {
            ChangeOp::Created => self.created = true,
            ChangeOp::Written => self.written = true,
            ChangeOp::Removed => self.removed = true,
            ChangeOp::Renamed => self.renamed = true,
            ChangeOp::PermissionsChanged => self.permissions_changed = true,
        }
        self
    }

    /// Whether the set contains `op`.
    pub fn contains(&self, op: ChangeOp) -> bool {
        match op {
            ChangeOp::Created => self.created,
            ChangeOp::Written => self.written,
            ChangeOp::Removed => self.removed,
            ChangeOp::Renamed => self.renamed,
            ChangeOp::PermissionsChanged => self.permissions_changed,
        }
    }

    /// Whether no operation is set.
    pub fn is_empty(&self) -> bool {
        ChangeOp::ALL.iter().all(|op| !self.contains(*op))
    }

    /// Iterate over the operations present in the set.
    pub fn iter(&self) -> impl Iterator<Item = ChangeOp> + '_ {
        ChangeOp::ALL.into_iter().filter(|op| self.contains(*op))
    }
}

impl fmt::Display for ChangeOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for op in self.iter() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", op.label())?;
            first = false;
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// What the classified path was at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// The path is a directory.
    Directory,

    /// The path is a regular file (or another non-directory object,
    /// flagged via [`FileMetadata::regular`]).
    RegularFile,

    /// The path no longer exists. Terminal; carries no metadata.
    Removed,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PathKind::Directory => "dir",
            PathKind::RegularFile => "file",
            PathKind::Removed => "removed",
        };
        write!(f, "{label}")
    }
}

/// Filesystem metadata captured at classification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Size in bytes.
    pub len: u64,

    /// Last modification time, if the filesystem reports one.
    pub modified: Option<DateTime<Utc>>,

    /// Unix permission bits (None on other platforms).
    pub permissions: Option<u32>,

    /// False for symlinks, sockets and other non-regular objects that are
    /// still reported with kind [`PathKind::RegularFile`].
    pub regular: bool,
}

impl FileMetadata {
    /// Capture metadata from a stat result.
    pub fn from_fs(meta: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(meta.permissions().mode())
        };
        #[cfg(not(unix))]
        let permissions = None;

        Self {
            len: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            permissions,
            regular: meta.is_file() || meta.is_dir(),
        }
    }
}

/// The normalized unit of output: one classified filesystem mutation.
///
/// Records are only built by the classifier, via [`ChangeRecord::removed`]
/// and [`ChangeRecord::observed`], which keep the invariant that metadata is
/// present exactly when the path still exists (`kind != Removed`). A removed
/// path must never be stat'd again: a quick recreate would hand back a
/// different object's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Absolute path the event refers to.
    pub path: PathBuf,

    /// What the path was at classification time.
    pub kind: PathKind,

    /// Raw operations carried by the notification.
    pub ops: ChangeOps,

    /// When the record was classified (not when the OS event fired).
    pub observed_at: DateTime<Utc>,

    /// Metadata of the object, present iff `kind != Removed`.
    pub metadata: Option<FileMetadata>,
}

impl ChangeRecord {
    /// Build a record for a path that no longer exists.
    pub fn removed(path: PathBuf, ops: ChangeOps) -> Self {
        Self {
            path,
            kind: PathKind::Removed,
            ops,
            observed_at: Utc::now(),
            metadata: None,
        }
    }

    /// Build a record for a path that was stat'd successfully.
    pub fn observed(path: PathBuf, kind: PathKind, ops: ChangeOps, metadata: FileMetadata) -> Self {
        debug_assert!(kind != PathKind::Removed);
        Self {
            path,
            kind,
            ops,
            observed_at: Utc::now(),
            metadata: Some(metadata),
        }
    }

    /// Whether this record denotes a removal.
    pub fn is_removed(&self) -> bool {
        self.kind == PathKind::Removed
    }

    /// Whether this record denotes a newly created directory.
    pub fn is_directory_created(&self) -> bool {
        self.kind == PathKind::Directory && self.ops.contains(ChangeOp::Created)
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] at {}",
            self.kind,
            self.path.display(),
            self.ops,
            self.observed_at.format("%Y%m%d-%H:%M:%S%.3f"),
        )
    }
}

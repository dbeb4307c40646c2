use crate::helpers::epoch_millis;
use crate::path;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::Metadata;

/// Operation family exposed by the storage facade.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum OperationKind {
    List,
    Stat,
    Copy,
    Move,
    Rename,
    Delete,
    History,
    Recover,
    Cleanup,
    Read,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Stat => "stat",
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Rename => "rename",
            Self::Delete => "delete",
            Self::History => "history",
            Self::Recover => "recover",
            Self::Cleanup => "cleanup",
            Self::Read => "read",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Copy | Self::Move | Self::Rename | Self::Delete | Self::Recover | Self::Cleanup
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a path's kind, size, timestamp and access at one instant.
///
/// Never re-validated: callers that need fresh data stat again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub is_file: bool,
    pub is_dir: bool,
    pub length: u64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub readable: bool,
    pub writable: bool,
}

impl Stat {
    /// Builds a snapshot from metadata. `read_only_root` masks writability.
    ///
    /// Roots pass symlink metadata, so a symlink shows up as neither file
    /// nor directory.
    pub fn from_metadata(meta: &Metadata, read_only_root: bool) -> Self {
        let (readable, writable) = access_bits(meta);
        Self {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            length: if meta.is_file() { meta.len() } else { 0 },
            last_modified: meta.modified().map(epoch_millis).unwrap_or(0),
            readable,
            writable: writable && !read_only_root,
        }
    }

    /// Neither a regular file nor a directory, e.g. a symlink. Walks treat
    /// these as leaves and never copy through them.
    pub fn is_special(&self) -> bool {
        !self.is_file && !self.is_dir
    }
}

#[cfg(unix)]
fn access_bits(meta: &Metadata) -> (bool, bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    (mode & 0o400 != 0, mode & 0o200 != 0)
}

#[cfg(not(unix))]
fn access_bits(meta: &Metadata) -> (bool, bool) {
    (true, !meta.permissions().readonly())
}

/// A soft-deleted entry in a root's trash.
///
/// `dir`/`name` is the last known location inside the root; nothing
/// guarantees that location is still free or even still valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFileStat {
    pub id: u64,
    pub dir: String,
    pub name: String,
    #[serde(flatten)]
    pub stat: Stat,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_deleted: DateTime<Utc>,
}

impl DeletedFileStat {
    /// Root-relative path the entry was deleted from.
    pub fn rpath(&self) -> String {
        path::join(&self.dir, &self.name)
    }

    pub fn is_dir(&self) -> bool {
        self.stat.is_dir
    }
}

/// Aggregate of what a trash prune removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashSummary {
    pub files: u64,
    pub dirs: u64,
    pub total_size: u64,
}

impl TrashSummary {
    pub fn add(&mut self, entry: &DeletedFileStat) {
        if entry.stat.is_dir {
            self.dirs += 1;
        } else {
            self.files += 1;
            self.total_size += entry.stat.length;
        }
    }
}

/// Outcome counts of a recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverCounts {
    pub success: u64,
    pub failure: u64,
}

/// Decision returned by walk and history visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Do not descend into this entry, keep going with siblings.
    Skip,
    /// Descend (for directories) and keep going.
    Recurse,
    /// Abort the whole walk.
    Stop,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    #[serde(flatten)]
    pub stat: Stat,
}

#[derive(Debug, Clone, Copy)]
pub enum ExitStatusLike {
    Ok,
    Warning,
    Error,
}

impl ExitStatusLike {
    pub fn as_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 2,
            Self::Error => 1,
        }
    }
}

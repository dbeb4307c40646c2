//! Two-phase bulk mutations: classify (dry-run), then execute.
//!
//! Classification maps every affected relative path to create, overwrite or
//! reject. Execution performs the classified actions entry by entry and
//! returns a partial-success report; one entry failing never aborts its
//! siblings. The filesystem may change between the two phases and execution
//! tolerates that rather than locking it out.

mod classify;
mod execute;
mod report;

pub use classify::{plan_delete, plan_transfer};
pub use execute::{execute_delete, execute_transfer};
pub use report::{
    DeleteReport, EnglishMessages, EntryFailure, ExecuteReport, ExecuteResult, FailureCause,
    MessageProvider, TransferReport,
};

use crate::root::Root;

/// Copy leaves the source in place; move removes it once the destination
/// write succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Why an entry cannot proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RejectReason {
    SourceNotFound,
    SourceNotValid,
    SourceNotDeletable,
    DestinationNotValid,
    DestinationNotWritable,
    ExtensionChanged,
    SameLocation,
    DestinationInsideSource,
    SourceInsideDestination,
    DirectoryNotEmpty,
    RootBoundary,
    ReadOnlyRoot,
    NotWritable,
}

impl RejectReason {
    /// Stable identifier, independent of any message provider.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceNotFound => "source_not_found",
            Self::SourceNotValid => "source_not_valid",
            Self::SourceNotDeletable => "source_not_deletable",
            Self::DestinationNotValid => "destination_not_valid",
            Self::DestinationNotWritable => "destination_not_writable",
            Self::ExtensionChanged => "extension_changed",
            Self::SameLocation => "same_location",
            Self::DestinationInsideSource => "destination_inside_source",
            Self::SourceInsideDestination => "source_inside_destination",
            Self::DirectoryNotEmpty => "directory_not_empty",
            Self::RootBoundary => "root_boundary",
            Self::ReadOnlyRoot => "read_only_root",
            Self::NotWritable => "not_writable",
        }
    }
}

/// Predicted outcome for one transfer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Create { src_is_dir: bool },
    Overwrite { src_is_dir: bool, dst_is_dir: bool },
    Rejected(RejectReason),
}

impl Outcome {
    pub fn proceeds(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn src_is_dir(&self) -> bool {
        match self {
            Self::Create { src_is_dir } | Self::Overwrite { src_is_dir, .. } => *src_is_dir,
            Self::Rejected(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    /// Report key, relative to the request's source directory.
    pub key: String,
    pub source: String,
    pub target: String,
    pub outcome: Outcome,
}

/// Dry-run result of a copy/move, in execution (pre-)order.
#[derive(Debug, Clone)]
pub struct TransferPlan<'a> {
    pub mode: TransferMode,
    pub source_root: &'a Root,
    pub target_root: &'a Root,
    pub entries: Vec<PlannedTransfer>,
}

/// Predicted outcome for one delete entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Delete { is_dir: bool },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    pub key: String,
    pub target: String,
    pub outcome: DeleteOutcome,
}

/// Dry-run result of a delete, children ahead of their parents.
#[derive(Debug, Clone)]
pub struct DeletePlan<'a> {
    pub root: &'a Root,
    pub entries: Vec<PlannedDelete>,
}

/// One name in a transfer request, optionally renamed at the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMapping {
    pub from: String,
    pub to: String,
}

impl EntryMapping {
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            from: name.clone(),
            to: name,
        }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Copy/move request between two directories, already resolved to roots.
#[derive(Debug, Clone)]
pub struct TransferRequest<'a> {
    pub mode: TransferMode,
    pub source_root: &'a Root,
    pub source_dir: String,
    pub target_root: &'a Root,
    pub target_dir: String,
    /// Empty means every child of `source_dir`.
    pub entries: Vec<EntryMapping>,
}

/// Delete request for names inside one directory.
#[derive(Debug, Clone)]
pub struct DeleteRequest<'a> {
    pub root: &'a Root,
    pub dir: String,
    /// Empty means the directory itself.
    pub names: Vec<String>,
    pub recursive: bool,
}

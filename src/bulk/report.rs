//! Wire shapes for dry-run and execute reports.
//!
//! The engine works on typed outcomes; they are flattened into string-keyed
//! maps only here, with reason text supplied by a [`MessageProvider`].

use super::{DeleteOutcome, DeletePlan, Outcome, RejectReason, TransferPlan};
use crate::errors::ErrorKind;
use serde::Serialize;
use std::collections::BTreeMap;

/// Source of user-facing rejection text.
pub trait MessageProvider: Send + Sync {
    fn reject(&self, reason: RejectReason) -> String;

    fn parent_failed(&self) -> String {
        "parent directory failed".to_string()
    }

    /// Text for an entry that passed classification but failed at execute.
    fn failed(&self, kind: ErrorKind) -> String {
        match kind {
            ErrorKind::NotFound => "source not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Conflict => "conflicting change",
            ErrorKind::PathInvalid => "path not valid",
            _ => "operation failed",
        }
        .to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishMessages;

impl MessageProvider for EnglishMessages {
    fn reject(&self, reason: RejectReason) -> String {
        match reason {
            RejectReason::SourceNotFound => "source not found",
            RejectReason::SourceNotValid => "source not valid",
            RejectReason::SourceNotDeletable => "source not deletable",
            RejectReason::DestinationNotValid => "destination not valid",
            RejectReason::DestinationNotWritable => "destination not writable",
            RejectReason::ExtensionChanged => "file extension cannot change",
            RejectReason::SameLocation => "source and destination are the same",
            RejectReason::DestinationInsideSource => "destination inside source",
            RejectReason::SourceInsideDestination => "source inside destination",
            RejectReason::DirectoryNotEmpty => "directory not empty",
            RejectReason::RootBoundary => "cannot delete a root",
            RejectReason::ReadOnlyRoot => "root is read-only",
            RejectReason::NotWritable => "not writable",
        }
        .to_string()
    }
}

/// `{ copying: {rpath: [srcIsDir, srcIsDir]}, overwriting: {rpath: [srcIsDir, dstIsDir]},
/// notcopying: {reason: [rpath, ...]} }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub copying: BTreeMap<String, [bool; 2]>,
    pub overwriting: BTreeMap<String, [bool; 2]>,
    pub notcopying: BTreeMap<String, Vec<String>>,
}

impl TransferReport {
    pub fn from_plan(plan: &TransferPlan<'_>, messages: &dyn MessageProvider) -> Self {
        let mut report = Self::default();
        for entry in &plan.entries {
            match entry.outcome {
                Outcome::Create { src_is_dir } => {
                    report.copying.insert(entry.key.clone(), [src_is_dir, src_is_dir]);
                }
                Outcome::Overwrite {
                    src_is_dir,
                    dst_is_dir,
                } => {
                    report
                        .overwriting
                        .insert(entry.key.clone(), [src_is_dir, dst_is_dir]);
                }
                Outcome::Rejected(reason) => {
                    report
                        .notcopying
                        .entry(messages.reject(reason))
                        .or_default()
                        .push(entry.key.clone());
                }
            }
        }
        report
    }
}

/// `{ deleting: [rpath, ...], notdeleting: {reason: [rpath, ...]} }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleting: Vec<String>,
    pub notdeleting: BTreeMap<String, Vec<String>>,
}

impl DeleteReport {
    pub fn from_plan(plan: &DeletePlan<'_>, messages: &dyn MessageProvider) -> Self {
        let mut report = Self::default();
        for entry in &plan.entries {
            match entry.outcome {
                DeleteOutcome::Delete { .. } => report.deleting.push(entry.key.clone()),
                DeleteOutcome::Rejected(reason) => report
                    .notdeleting
                    .entry(messages.reject(reason))
                    .or_default()
                    .push(entry.key.clone()),
            }
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Rejected(RejectReason),
    ParentFailed,
    /// Execute-time error, reduced to its kind; the full error only goes to
    /// the log.
    Failed(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub key: String,
    pub cause: FailureCause,
}

/// Per-entry results of an execute pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteReport {
    pub succeeded: Vec<String>,
    pub failures: Vec<EntryFailure>,
}

/// `{ result: [rpath, ...], warns: [message, ...] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteResult {
    pub result: Vec<String>,
    pub warns: Vec<String>,
}

impl ExecuteReport {
    pub(crate) fn succeed(&mut self, key: &str) {
        self.succeeded.push(key.to_string());
    }

    pub(crate) fn fail(&mut self, key: &str, cause: FailureCause) {
        self.failures.push(EntryFailure {
            key: key.to_string(),
            cause,
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn to_wire(&self, messages: &dyn MessageProvider) -> ExecuteResult {
        ExecuteResult {
            result: self.succeeded.clone(),
            warns: self
                .failures
                .iter()
                .map(|failure| {
                    let text = match &failure.cause {
                        FailureCause::Rejected(reason) => messages.reject(*reason),
                        FailureCause::ParentFailed => messages.parent_failed(),
                        FailureCause::Failed(kind) => messages.failed(*kind),
                    };
                    format!("{}: {}", failure.key, text)
                })
                .collect(),
        }
    }
}

use super::report::{ExecuteReport, FailureCause};
use super::{DeleteOutcome, DeletePlan, Outcome, PlannedTransfer, TransferMode, TransferPlan};
use crate::errors::CoreError;
use crate::fs::move_file;
use crate::path;
use crate::root::{lock_pair, Root};
use crate::walk::post_order;
use tracing::{debug, info, warn};

/// Removes whatever sits at `rpath` so a transfer can take its place.
/// Subtrees go children first; history-capable roots keep them in the trash.
fn displace(root: &Root, rpath: &str) -> crate::Result<()> {
    for (entry, _) in post_order(root, rpath) {
        root.remove_entry(&entry)?;
    }
    Ok(())
}

fn transfer_file(plan: &TransferPlan<'_>, entry: &PlannedTransfer, overwrite: bool) -> crate::Result<()> {
    let src_phys = plan.source_root.physical(&entry.source);
    let dst_phys = plan.target_root.physical(&entry.target);

    // The source may have vanished or been swapped for a link since
    // classification.
    let src = plan.source_root.stat(&entry.source)?;
    if plan.mode == TransferMode::Copy && src.is_special() {
        return Err(CoreError::invalid_input(format!("{} is not a regular file", entry.source)));
    }

    if overwrite && plan.target_root.fs().exists(&dst_phys) {
        displace(plan.target_root, &entry.target)?;
    }
    if let Some(parent) = dst_phys.parent() {
        plan.target_root.fs().create_dir_all(parent)?;
    }

    match plan.mode {
        TransferMode::Copy => {
            if let Err(err) = plan.target_root.fs().copy_file(&src_phys, &dst_phys) {
                let _ = plan.target_root.fs().remove_file(&dst_phys);
                return Err(err);
            }
            Ok(())
        }
        TransferMode::Move => move_file(plan.source_root.fs(), &src_phys, &dst_phys),
    }
}

fn transfer_dir(plan: &TransferPlan<'_>, entry: &PlannedTransfer, outcome: Outcome) -> crate::Result<()> {
    plan.source_root.stat(&entry.source)?;
    let dst_phys = plan.target_root.physical(&entry.target);
    match outcome {
        Outcome::Overwrite {
            dst_is_dir: true, ..
        } => Ok(()),
        Outcome::Overwrite {
            dst_is_dir: false, ..
        } => {
            displace(plan.target_root, &entry.target)?;
            plan.target_root.fs().create_dir(&dst_phys)
        }
        _ => plan.target_root.fs().create_dir_all(&dst_phys),
    }
}

/// Executes a copy/move plan.
///
/// Only a read-only destination (or, for moves, source) root fails the call
/// as a whole; everything else is reported per entry.
pub fn execute_transfer(plan: &TransferPlan<'_>) -> crate::Result<ExecuteReport> {
    plan.target_root.check_writable()?;
    if plan.mode == TransferMode::Move {
        plan.source_root.check_writable()?;
    }
    let _guards = lock_pair(plan.source_root, plan.target_root);

    let mut report = ExecuteReport::default();
    let mut failed_dirs: Vec<&str> = Vec::new();
    let mut moved_dirs: Vec<&str> = Vec::new();

    for entry in &plan.entries {
        if failed_dirs
            .iter()
            .any(|dir| path::is_within(&entry.source, dir))
        {
            report.fail(&entry.key, FailureCause::ParentFailed);
            continue;
        }

        let result = match entry.outcome {
            Outcome::Rejected(reason) => {
                report.fail(&entry.key, FailureCause::Rejected(reason));
                continue;
            }
            outcome if outcome.src_is_dir() => transfer_dir(plan, entry, outcome),
            outcome => transfer_file(plan, entry, matches!(outcome, Outcome::Overwrite { .. })),
        };

        match result {
            Ok(()) => {
                debug!(key = %entry.key, "transferred");
                if entry.outcome.src_is_dir() && plan.mode == TransferMode::Move {
                    moved_dirs.push(&entry.source);
                }
                report.succeed(&entry.key);
            }
            Err(err) => {
                if err.is_not_found() {
                    debug!(key = %entry.key, error = %err, "source vanished before execute");
                } else {
                    warn!(key = %entry.key, error = %err, "transfer failed");
                }
                if entry.outcome.src_is_dir() {
                    failed_dirs.push(&entry.source);
                }
                report.fail(&entry.key, FailureCause::Failed(err.kind()));
            }
        }
    }

    // Prune source directories a move left empty, deepest first.
    for dir in moved_dirs.iter().rev() {
        let physical = plan.source_root.physical(dir);
        let empty = plan
            .source_root
            .fs()
            .list_dir(&physical)
            .is_ok_and(|children| children.is_empty());
        if empty {
            if let Err(err) = plan.source_root.fs().remove_dir(&physical) {
                debug!(rpath = %dir, error = %err, "left source directory in place");
            }
        }
    }

    info!(
        mode = ?plan.mode,
        source = plan.source_root.name(),
        target = plan.target_root.name(),
        succeeded = report.succeeded.len(),
        failed = report.failures.len(),
        "bulk transfer finished"
    );
    Ok(report)
}

/// Executes a delete plan in its (post-)order as one transaction.
pub fn execute_delete(plan: &DeletePlan<'_>) -> crate::Result<ExecuteReport> {
    plan.root.check_writable()?;
    plan.root.transaction(|root| {
        let mut report = ExecuteReport::default();
        for entry in &plan.entries {
            match entry.outcome {
                DeleteOutcome::Rejected(reason) => {
                    report.fail(&entry.key, FailureCause::Rejected(reason));
                }
                DeleteOutcome::Delete { .. } => match root.remove_entry(&entry.target) {
                    Ok(trashed) => {
                        debug!(key = %entry.key, trash_id = ?trashed.map(|t| t.id), "deleted");
                        report.succeed(&entry.key);
                    }
                    Err(err) => {
                        warn!(key = %entry.key, error = %err, "delete failed");
                        report.fail(&entry.key, FailureCause::Failed(err.kind()));
                    }
                },
            }
        }
        info!(
            root = root.name(),
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "bulk delete finished"
        );
        Ok(report)
    })
}

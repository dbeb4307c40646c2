use super::{
    DeleteOutcome, DeletePlan, DeleteRequest, EntryMapping, Outcome, PlannedDelete,
    PlannedTransfer, RejectReason, TransferMode, TransferPlan, TransferRequest,
};
use crate::models::{Stat, Visit};
use crate::path;
use crate::root::Root;
use crate::walk::{post_order, walk};
use tracing::debug;

/// Writability of the nearest existing ancestor of `rpath`, which must be a
/// directory for anything to be created beneath it.
fn ancestor_writable(root: &Root, rpath: &str) -> bool {
    let mut current = path::split_parent(rpath).map(|(dir, _)| dir.to_string());
    while let Some(dir) = current {
        if let Ok(stat) = root.stat(&dir) {
            return stat.is_dir && stat.writable;
        }
        current = path::split_parent(&dir).map(|(parent, _)| parent.to_string());
    }
    false
}

fn reject(key: &str, source: &str, target: &str, reason: RejectReason) -> PlannedTransfer {
    PlannedTransfer {
        key: key.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        outcome: Outcome::Rejected(reason),
    }
}

/// Applies the per-entry rules to one source/destination pair.
///
/// `fresh_parent` means the destination's parent is itself about to be
/// created (or replaced by a directory), so nothing exists there yet.
fn classify_entry(
    req: &TransferRequest<'_>,
    source: &str,
    target: &str,
    src: Option<Stat>,
    fresh_parent: bool,
) -> Outcome {
    let Some(src) = src.filter(|s| s.readable) else {
        return Outcome::Rejected(RejectReason::SourceNotFound);
    };
    if !path::is_valid_name(path::file_name(source)) {
        return Outcome::Rejected(RejectReason::SourceNotValid);
    }
    // A copy would read through a symlink; only a move relocates the link.
    if req.mode == TransferMode::Copy && src.is_special() {
        return Outcome::Rejected(RejectReason::SourceNotValid);
    }
    if req.mode == TransferMode::Move && req.source_root.is_read_only() {
        return Outcome::Rejected(RejectReason::SourceNotDeletable);
    }
    if req.target_root.is_read_only() {
        return Outcome::Rejected(RejectReason::DestinationNotWritable);
    }
    if fresh_parent {
        return Outcome::Create {
            src_is_dir: src.is_dir,
        };
    }

    match req.target_root.stat(target) {
        Ok(dst) if !dst.writable => Outcome::Rejected(RejectReason::DestinationNotWritable),
        Ok(dst) => Outcome::Overwrite {
            src_is_dir: src.is_dir,
            dst_is_dir: dst.is_dir,
        },
        Err(_) if ancestor_writable(req.target_root, target) => Outcome::Create {
            src_is_dir: src.is_dir,
        },
        Err(_) => Outcome::Rejected(RejectReason::DestinationNotWritable),
    }
}

/// Checks that apply only to the entries named in the request.
fn top_level_conflict(
    req: &TransferRequest<'_>,
    mapping: &EntryMapping,
    source: &str,
    target: &str,
) -> Option<RejectReason> {
    if !path::is_valid_name(&mapping.from) {
        return Some(RejectReason::SourceNotValid);
    }
    if !path::is_valid_name(&mapping.to) {
        return Some(RejectReason::DestinationNotValid);
    }

    // Compared by resolved location so aliased roots cannot slip past.
    let src_phys = req.source_root.location(source);
    let dst_phys = req.target_root.location(target);
    if src_phys == dst_phys {
        return Some(RejectReason::SameLocation);
    }
    if dst_phys.starts_with(&src_phys) {
        return Some(RejectReason::DestinationInsideSource);
    }
    if src_phys.starts_with(&dst_phys) {
        return Some(RejectReason::SourceInsideDestination);
    }

    let src_is_file = req.source_root.stat(source).is_ok_and(|s| s.is_file);
    if src_is_file && path::extension(&mapping.from) != path::extension(&mapping.to) {
        return Some(RejectReason::ExtensionChanged);
    }
    None
}

/// Dry-run of a copy or move.
///
/// Fails only when the request as a whole is unusable (e.g. its source
/// directory cannot be listed); every per-entry problem is data.
pub fn plan_transfer<'a>(req: &TransferRequest<'a>) -> crate::Result<TransferPlan<'a>> {
    let mappings = if req.entries.is_empty() {
        req.source_root
            .fs()
            .list_dir(&req.source_root.physical(&req.source_dir))?
            .into_iter()
            .map(EntryMapping::same)
            .collect()
    } else {
        req.entries.clone()
    };

    let mut entries = Vec::new();
    for mapping in &mappings {
        let source = path::join(&req.source_dir, &mapping.from);
        let target = path::join(&req.target_dir, &mapping.to);
        if let Some(reason) = top_level_conflict(req, mapping, &source, &target) {
            entries.push(reject(&mapping.from, &source, &target, reason));
            continue;
        }

        // Parallel stack of (source rpath, target rpath, children-are-fresh)
        // for the directories currently being descended.
        let mut stack: Vec<(String, String, bool)> = Vec::new();
        walk(req.source_root, &source, &mut |rpath, stat| {
            while let Some((dir, _, _)) = stack.last() {
                if path::is_within(rpath, dir) && rpath != dir {
                    break;
                }
                stack.pop();
            }
            let (target_path, fresh_parent) = match stack.last() {
                Some((dir, target_dir, fresh)) => (
                    path::join(target_dir, &rpath[dir.len() + 1..]),
                    *fresh,
                ),
                None => (target.clone(), false),
            };
            let key = path::join(&mapping.from, rpath[source.len()..].trim_start_matches('/'));

            let outcome = classify_entry(req, rpath, &target_path, stat, fresh_parent);
            debug!(key = %key, ?outcome, "classified");
            entries.push(PlannedTransfer {
                key,
                source: rpath.to_string(),
                target: target_path.clone(),
                outcome,
            });

            match outcome {
                Outcome::Create { src_is_dir: true } => {
                    stack.push((rpath.to_string(), target_path, true));
                    Visit::Recurse
                }
                Outcome::Overwrite {
                    src_is_dir: true,
                    dst_is_dir,
                } => {
                    stack.push((rpath.to_string(), target_path, !dst_is_dir));
                    Visit::Recurse
                }
                _ => Visit::Skip,
            }
        });
    }

    Ok(TransferPlan {
        mode: req.mode,
        source_root: req.source_root,
        target_root: req.target_root,
        entries,
    })
}

fn parent_writable(root: &Root, rpath: &str) -> bool {
    match path::split_parent(rpath) {
        Some((dir, _)) => root.stat(dir).is_ok_and(|s| s.is_dir && s.writable),
        None => false,
    }
}

/// Dry-run of a delete. Recursive requests expand directories post-order.
pub fn plan_delete<'a>(req: &DeleteRequest<'a>) -> crate::Result<DeletePlan<'a>> {
    let targets: Vec<(String, String)> = if req.names.is_empty() {
        vec![(path::file_name(&req.dir).to_string(), req.dir.clone())]
    } else {
        req.names
            .iter()
            .map(|name| (name.clone(), path::join(&req.dir, name)))
            .collect()
    };

    let mut entries = Vec::new();
    for (name, target) in targets {
        let rejected = |reason| PlannedDelete {
            key: name.clone(),
            target: target.clone(),
            outcome: DeleteOutcome::Rejected(reason),
        };
        if target.is_empty() {
            entries.push(rejected(RejectReason::RootBoundary));
            continue;
        }
        if !req.names.is_empty() && !path::is_valid_name(&name) {
            entries.push(rejected(RejectReason::SourceNotValid));
            continue;
        }
        if req.root.is_read_only() {
            entries.push(rejected(RejectReason::ReadOnlyRoot));
            continue;
        }
        let Ok(stat) = req.root.stat(&target) else {
            entries.push(rejected(RejectReason::SourceNotFound));
            continue;
        };
        if !parent_writable(req.root, &target) {
            entries.push(rejected(RejectReason::NotWritable));
            continue;
        }
        if !stat.is_dir {
            entries.push(PlannedDelete {
                key: name.clone(),
                target: target.clone(),
                outcome: DeleteOutcome::Delete { is_dir: false },
            });
            continue;
        }

        let has_children = req
            .root
            .fs()
            .list_dir(&req.root.physical(&target))
            .map(|children| !children.is_empty())
            .unwrap_or(true);
        if has_children && !req.recursive {
            entries.push(rejected(RejectReason::DirectoryNotEmpty));
            continue;
        }

        for (rpath, stat) in post_order(req.root, &target) {
            let key = path::join(&name, rpath[target.len()..].trim_start_matches('/'));
            let outcome = match stat {
                None => DeleteOutcome::Rejected(RejectReason::SourceNotFound),
                Some(s) if rpath != target && !parent_writable(req.root, &rpath) => {
                    debug!(rpath = %rpath, dir = s.is_dir, "parent not writable");
                    DeleteOutcome::Rejected(RejectReason::NotWritable)
                }
                Some(s) => DeleteOutcome::Delete { is_dir: s.is_dir },
            };
            entries.push(PlannedDelete {
                key,
                target: rpath,
                outcome,
            });
        }
    }

    Ok(DeletePlan {
        root: req.root,
        entries,
    })
}

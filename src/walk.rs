//! Depth-first tree walk with an explicit skip/recurse/stop decision.

use crate::models::{Stat, Visit};
use crate::path;
use crate::root::Root;
use tracing::warn;

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    Completed,
    Stopped,
}

/// Visits `start` and, when the visitor asks for it, its descendants in
/// pre-order, children sorted by name.
///
/// `stat` is `None` for entries that vanished or could not be read. A
/// directory whose listing fails is treated as having no children.
pub fn walk(
    root: &Root,
    start: &str,
    visit: &mut impl FnMut(&str, Option<Stat>) -> Visit,
) -> WalkEnd {
    let stat = root.stat(start).ok();
    match visit(start, stat) {
        Visit::Stop => return WalkEnd::Stopped,
        Visit::Skip => return WalkEnd::Completed,
        Visit::Recurse => {}
    }
    if !stat.is_some_and(|s| s.is_dir) {
        return WalkEnd::Completed;
    }

    let children = match root.fs().list_dir(&root.physical(start)) {
        Ok(children) => children,
        Err(err) => {
            warn!(rpath = start, error = %err, "cannot list directory");
            return WalkEnd::Completed;
        }
    };
    for child in children {
        if walk(root, &path::join(start, &child), visit) == WalkEnd::Stopped {
            return WalkEnd::Stopped;
        }
    }
    WalkEnd::Completed
}

/// Every path at or below `start`, children before their parent.
pub fn post_order(root: &Root, start: &str) -> Vec<(String, Option<Stat>)> {
    let mut pre = Vec::new();
    walk(root, start, &mut |rpath, stat| {
        pre.push((rpath.to_string(), stat));
        Visit::Recurse
    });
    // Reversed pre-order puts every descendant ahead of its ancestor.
    pre.reverse();
    pre
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tree() -> (TempDir, Root) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::create_dir_all(tmp.path().join("c")).unwrap();
        fs::write(tmp.path().join("a/b/f"), b"").unwrap();
        fs::write(tmp.path().join("a/g"), b"").unwrap();
        let root = Root::new("r", tmp.path(), Arc::new(RealFileSystem)).unwrap();
        (tmp, root)
    }

    #[test]
    fn pre_order_sorted() {
        let (_tmp, root) = tree();
        let mut seen = Vec::new();
        walk(&root, "", &mut |rpath, _| {
            seen.push(rpath.to_string());
            Visit::Recurse
        });
        assert_eq!(seen, vec!["", "a", "a/b", "a/b/f", "a/g", "c"]);
    }

    #[test]
    fn skip_prunes_subtree() {
        let (_tmp, root) = tree();
        let mut seen = Vec::new();
        walk(&root, "", &mut |rpath, _| {
            seen.push(rpath.to_string());
            if rpath == "a" {
                Visit::Skip
            } else {
                Visit::Recurse
            }
        });
        assert_eq!(seen, vec!["", "a", "c"]);
    }

    #[test]
    fn stop_ends_walk() {
        let (_tmp, root) = tree();
        let mut seen = Vec::new();
        let end = walk(&root, "", &mut |rpath, _| {
            seen.push(rpath.to_string());
            if rpath == "a/b" {
                Visit::Stop
            } else {
                Visit::Recurse
            }
        });
        assert_eq!(end, WalkEnd::Stopped);
        assert_eq!(seen, vec!["", "a", "a/b"]);
    }

    #[test]
    fn post_order_children_first() {
        let (_tmp, root) = tree();
        let order: Vec<String> = post_order(&root, "a").into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["a/g", "a/b/f", "a/b", "a"]);
    }

    #[test]
    fn missing_start_reports_none() {
        let (_tmp, root) = tree();
        let mut stats = Vec::new();
        walk(&root, "nope", &mut |_, stat| {
            stats.push(stat);
            Visit::Recurse
        });
        assert_eq!(stats, vec![None]);
    }
}

//! Named mount points.
//!
//! A [`Root`] owns one physical subtree, is the unit of write serialization
//! (its transaction lock), and optionally owns a trash store.

use crate::errors::CoreError;
use crate::file_info::FileInfo;
use crate::fs::{physical_join, resolve_existing, FileSystem};
use crate::helpers::print_size;
use crate::models::{DeletedFileStat, RecoverCounts, Stat, TrashSummary, Visit};
use crate::path;
use crate::trash::TrashStore;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Root {
    name: String,
    base: PathBuf,
    real_base: PathBuf,
    read_only: bool,
    fs: Arc<dyn FileSystem>,
    trash: Option<TrashStore>,
    writer: ReentrantMutex<()>,
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("read_only", &self.read_only)
            .field("trash", &self.trash)
            .finish()
    }
}

impl Root {
    /// Creates a plain (history-less) root over an existing directory.
    pub fn new(
        name: impl Into<String>,
        base: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> crate::Result<Self> {
        let name = name.into();
        let base = base.into();
        path::check_name(&name)?;
        let meta = fs.metadata(&base)?;
        if !meta.is_dir() {
            return Err(CoreError::invalid_input(format!(
                "root {name}: {} is not a directory",
                base.display()
            )));
        }
        let real_base = fs.canonicalize(&base)?;
        Ok(Self {
            name,
            base,
            real_base,
            read_only: false,
            fs,
            trash: None,
            writer: ReentrantMutex::new(()),
        })
    }

    /// Makes the root history-capable, keeping its trash under `dir`.
    pub fn with_trash(mut self, dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let dir = dir.into();
        let inside = dir.starts_with(&self.base)
            || resolve_existing(self.fs.as_ref(), &dir).starts_with(&self.real_base);
        if inside {
            return Err(CoreError::invalid_input(format!(
                "root {}: trash {} lies inside the root",
                self.name,
                dir.display()
            )));
        }
        self.trash = Some(TrashStore::open(Arc::clone(&self.fs), dir)?);
        Ok(self)
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn supports_history(&self) -> bool {
        self.trash.is_some()
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub(crate) fn trash(&self) -> crate::Result<&TrashStore> {
        self.trash
            .as_ref()
            .ok_or_else(|| CoreError::unsupported(format!("root {} keeps no history", self.name)))
    }

    /// Physical location of a normalized root-relative path.
    pub fn physical(&self, rpath: &str) -> PathBuf {
        physical_join(&self.base, rpath)
    }

    /// Navigates to a root-relative path.
    pub fn file_info(&self, rpath: &str) -> crate::Result<FileInfo<'_>> {
        let rpath = path::normalize_relative(rpath)?;
        self.check_contained(&rpath)?;
        Ok(FileInfo::new(self, rpath))
    }

    /// Refuses paths whose physical location, once symlinks are resolved,
    /// leaves the root's directory.
    pub(crate) fn check_contained(&self, rpath: &str) -> crate::Result<()> {
        let real = resolve_existing(self.fs.as_ref(), &self.physical(rpath));
        if real.starts_with(&self.real_base) {
            Ok(())
        } else {
            warn!(root = %self.name, rpath, "path escapes its root");
            Err(CoreError::path_invalid(format!("/{}/{rpath} escapes its root", self.name)))
        }
    }

    /// Resolved physical identity of `rpath`: its parent is canonicalized,
    /// the final component is kept as is so a symlink names itself.
    pub(crate) fn location(&self, rpath: &str) -> PathBuf {
        let physical = self.physical(rpath);
        match (physical.parent(), physical.file_name()) {
            (Some(parent), Some(name)) if !rpath.is_empty() => {
                resolve_existing(self.fs.as_ref(), parent).join(name)
            }
            _ => self.real_base.clone(),
        }
    }

    /// The root itself as a [`FileInfo`].
    pub fn as_file_info(&self) -> FileInfo<'_> {
        FileInfo::new(self, String::new())
    }

    pub(crate) fn stat(&self, rpath: &str) -> crate::Result<Stat> {
        // A base mounted through a symlink is followed; entries below it never are.
        let physical = self.physical(rpath);
        let meta = if rpath.is_empty() {
            self.fs.metadata(&physical)?
        } else {
            self.fs.symlink_metadata(&physical)?
        };
        Ok(Stat::from_metadata(&meta, self.read_only))
    }

    /// Runs `body` while holding this root's writer lock.
    ///
    /// Submissions against one root execute one at a time, in lock order.
    /// There is no rollback: steps completed before a failure stay done.
    pub fn transaction<T>(&self, body: impl FnOnce(&Root) -> T) -> T {
        let _guard = self.writer.lock();
        body(self)
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Refuses mutation of read-only roots.
    pub(crate) fn check_writable(&self) -> crate::Result<()> {
        if self.read_only {
            Err(CoreError::permission_denied(format!("root {} is read-only", self.name)))
        } else {
            Ok(())
        }
    }

    /// Removes a file or empty directory, via the trash when there is one.
    pub(crate) fn remove_entry(&self, rpath: &str) -> crate::Result<Option<DeletedFileStat>> {
        self.check_writable()?;
        if rpath.is_empty() {
            return Err(CoreError::permission_denied(format!(
                "root {} cannot be deleted",
                self.name
            )));
        }
        let physical = self.physical(rpath);
        let stat = self.stat(rpath)?;
        if stat.is_dir && !self.fs.list_dir(&physical)?.is_empty() {
            return Err(CoreError::conflict(format!("directory not empty: {rpath}")));
        }
        match &self.trash {
            Some(trash) => trash.put(&physical, rpath, stat).map(Some),
            None if stat.is_dir => self.fs.remove_dir(&physical).map(|()| None),
            None => self.fs.remove_file(&physical).map(|()| None),
        }
    }

    /// Streams trash entries last seen at `dir`/`name` (or under `dir`).
    pub fn history(
        &self,
        dir: &str,
        name: &str,
        dirs_only: bool,
        visit: impl FnMut(&DeletedFileStat) -> Visit,
    ) -> crate::Result<()> {
        self.trash()?.history(dir, name, dirs_only, visit)
    }

    pub fn scan_trash(&self, visit: impl FnMut(&DeletedFileStat) -> Visit) -> crate::Result<()> {
        self.trash()?.scan(visit)
    }

    /// Prunes every trash entry selected by `predicate`.
    pub fn cleanup_trash(
        &self,
        predicate: impl FnMut(&DeletedFileStat) -> bool,
    ) -> crate::Result<TrashSummary> {
        let trash = self.trash()?;
        self.transaction(|_| {
            let summary = trash.cleanup(predicate)?;
            info!(
                root = %self.name,
                files = summary.files,
                dirs = summary.dirs,
                freed = %print_size(summary.total_size),
                "pruned trash"
            );
            Ok(summary)
        })
    }

    /// Re-creates each entry at its original relative location under `dest`.
    ///
    /// One entry failing never blocks the rest.
    pub fn recover(&self, dest: &Root, entries: &[DeletedFileStat]) -> crate::Result<RecoverCounts> {
        let trash = self.trash()?;
        dest.check_writable()?;
        let _guards = lock_pair(self, dest);

        let mut ordered: Vec<&DeletedFileStat> = entries.iter().collect();
        // Shallow entries first so recovered directories exist before their children.
        ordered.sort_by_key(|entry| (entry.rpath().split('/').count(), entry.id));

        let mut counts = RecoverCounts::default();
        for entry in ordered {
            let rpath = entry.rpath();
            let outcome = path::normalize_relative(&rpath).and_then(|rpath| {
                dest.check_contained(&rpath)?;
                trash.restore(entry, &dest.physical(&rpath))
            });
            match outcome {
                Ok(()) => counts.success += 1,
                Err(err) => {
                    warn!(id = entry.id, rpath = %rpath, error = %err, "recovery failed");
                    counts.failure += 1;
                }
            }
        }
        info!(
            root = %self.name,
            dest = %dest.name,
            success = counts.success,
            failure = counts.failure,
            "recovered trash entries"
        );
        Ok(counts)
    }
}

/// Acquires the writer locks of two roots in name order.
pub(crate) fn lock_pair<'a>(
    a: &'a Root,
    b: &'a Root,
) -> (ReentrantMutexGuard<'a, ()>, Option<ReentrantMutexGuard<'a, ()>>) {
    if std::ptr::eq(a, b) {
        return (a.lock(), None);
    }
    let (first, second) = if a.name <= b.name { (a, b) } else { (b, a) };
    let first = first.lock();
    (first, Some(second.lock()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn history_root(tmp: &TempDir) -> Root {
        let base = tmp.path().join("docs");
        fs::create_dir_all(&base).unwrap();
        Root::new("docs", &base, Arc::new(RealFileSystem))
            .unwrap()
            .with_trash(tmp.path().join("trash"))
            .unwrap()
    }

    #[test]
    fn rejects_trash_inside_root() {
        let tmp = TempDir::new().unwrap();
        let err = Root::new("docs", tmp.path(), Arc::new(RealFileSystem))
            .unwrap()
            .with_trash(tmp.path().join(".trash"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn root_boundary_cannot_be_removed() {
        let tmp = TempDir::new().unwrap();
        let root = history_root(&tmp);
        let err = root.remove_entry("").unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));
    }

    #[test]
    fn read_only_root_refuses_removal() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("ro");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("f"), b"x").unwrap();
        let root = Root::new("ro", &base, Arc::new(RealFileSystem))
            .unwrap()
            .with_read_only(true);

        assert!(matches!(root.remove_entry("f"), Err(CoreError::PermissionDenied(_))));
        assert!(base.join("f").exists());
        assert!(!root.stat("f").unwrap().writable);
    }

    #[test]
    fn history_requires_trash() {
        let tmp = TempDir::new().unwrap();
        let root = Root::new("plain", tmp.path(), Arc::new(RealFileSystem)).unwrap();
        assert!(!root.supports_history());
        let err = root.history("", "", false, |_| Visit::Recurse).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation(_)));
    }

    #[test]
    fn recover_counts_successes_and_failures() {
        let tmp = TempDir::new().unwrap();
        let root = history_root(&tmp);
        fs::write(root.physical("a"), b"A").unwrap();
        fs::write(root.physical("b"), b"B").unwrap();
        let a = root.remove_entry("a").unwrap().unwrap();
        let b = root.remove_entry("b").unwrap().unwrap();
        fs::write(root.physical("b"), b"squatter").unwrap();

        let counts = root.recover(&root, &[a, b]).unwrap();
        assert_eq!(counts, RecoverCounts { success: 1, failure: 1 });
        assert_eq!(fs::read(root.physical("a")).unwrap(), b"A");
        assert_eq!(fs::read(root.physical("b")).unwrap(), b"squatter");
    }

    #[test]
    fn nested_transactions_do_not_deadlock() {
        let tmp = TempDir::new().unwrap();
        let root = history_root(&tmp);
        let value = root.transaction(|r| r.transaction(|_| 42));
        assert_eq!(value, 42);
    }
}

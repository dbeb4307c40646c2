//! Storage facade: resolves context paths to roots and runs operations
//! under each root's writer lock.

use crate::bulk::{
    execute_delete, execute_transfer, plan_delete, plan_transfer, DeleteReport, DeleteRequest,
    EnglishMessages, EntryMapping, ExecuteResult, MessageProvider, TransferMode, TransferReport,
    TransferRequest,
};
use crate::config::StorageConfig;
use crate::errors::CoreError;
use crate::file_info::{Content, FileInfo};
use crate::fs::FileSystem;
use crate::models::{DeletedFileStat, ListEntry, RecoverCounts, Stat, TrashSummary, Visit};
use crate::path;
use crate::root::{lock_pair, Root};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Where a cpath points.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    /// The synthetic listing of all mounted roots.
    Top,
    Entry { root: &'a Root, rpath: String },
}

pub struct Storage {
    roots: BTreeMap<String, Arc<Root>>,
    messages: Box<dyn MessageProvider>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("roots", &self.roots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self {
            roots: BTreeMap::new(),
            messages: Box::new(EnglishMessages),
        }
    }

    /// Builds and mounts every configured root.
    pub fn from_config(config: &StorageConfig, fs: Arc<dyn FileSystem>) -> crate::Result<Self> {
        config.validate()?;
        let mut storage = Self::new();
        for rc in &config.roots {
            let mut root = Root::new(&rc.name, &rc.path, Arc::clone(&fs))?.with_read_only(rc.read_only);
            if let Some(trash) = &rc.trash {
                root = root.with_trash(trash)?;
            }
            storage.mount(root)?;
        }
        Ok(storage)
    }

    pub fn with_messages(mut self, messages: Box<dyn MessageProvider>) -> Self {
        self.messages = messages;
        self
    }

    pub fn messages(&self) -> &dyn MessageProvider {
        self.messages.as_ref()
    }

    pub fn mount(&mut self, root: Root) -> crate::Result<()> {
        if self.roots.contains_key(root.name()) {
            return Err(CoreError::conflict(format!("root {} already mounted", root.name())));
        }
        debug!(root = root.name(), base = %root.base().display(), history = root.supports_history(), "mounted");
        self.roots.insert(root.name().to_string(), Arc::new(root));
        Ok(())
    }

    pub fn roots(&self) -> impl Iterator<Item = &Root> {
        self.roots.values().map(|root| root.as_ref())
    }

    pub fn root(&self, name: &str) -> crate::Result<&Root> {
        self.roots
            .get(name)
            .map(|root| root.as_ref())
            .ok_or_else(|| CoreError::not_found(format!("no root named {name}")))
    }

    /// Resolves a cpath to its root and root-relative path.
    pub fn resolve(&self, cpath: &str) -> crate::Result<Resolved<'_>> {
        let normalized = path::normalize(cpath)?;
        let trimmed = normalized.trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok(Resolved::Top);
        }
        let (name, rpath) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        Ok(Resolved::Entry {
            root: self.root(name)?,
            rpath: rpath.to_string(),
        })
    }

    fn resolve_entry(&self, cpath: &str) -> crate::Result<(&Root, String)> {
        match self.resolve(cpath)? {
            Resolved::Entry { root, rpath } => {
                root.check_contained(&rpath)?;
                Ok((root, rpath))
            }
            Resolved::Top => Err(CoreError::invalid_input(
                "the root listing is not a storage location",
            )),
        }
    }

    /// Resolves to a history-capable root; the single place trash
    /// operations are gated.
    fn resolve_history(&self, cpath: &str) -> crate::Result<(&Root, String)> {
        let (root, rpath) = self.resolve_entry(cpath)?;
        if !root.supports_history() {
            return Err(CoreError::unsupported(format!(
                "root {} keeps no history",
                root.name()
            )));
        }
        Ok((root, rpath))
    }

    pub fn file_info(&self, cpath: &str) -> crate::Result<FileInfo<'_>> {
        let (root, rpath) = self.resolve_entry(cpath)?;
        Ok(root.file_info(&rpath)?)
    }

    pub fn stat(&self, cpath: &str) -> crate::Result<Stat> {
        self.file_info(cpath)?.stat()
    }

    pub fn content(&self, cpath: &str) -> crate::Result<Content> {
        self.file_info(cpath)?.content()
    }

    /// Lists a directory, or every mounted root for the empty cpath.
    pub fn list(&self, cpath: &str) -> crate::Result<Vec<ListEntry>> {
        match self.resolve(cpath)? {
            Resolved::Top => Ok(self
                .roots()
                .filter_map(|root| {
                    root.as_file_info().stat().ok().map(|stat| ListEntry {
                        name: root.name().to_string(),
                        stat,
                    })
                })
                .collect()),
            Resolved::Entry { root, rpath } => {
                let dir = root.file_info(&rpath)?;
                Ok(dir
                    .read_dir()?
                    .into_iter()
                    .filter_map(|child| {
                        let stat = child.stat().ok()?;
                        Some(ListEntry {
                            name: child.name().to_string(),
                            stat,
                        })
                    })
                    .collect())
            }
        }
    }

    /// Runs `body` as one ordered unit against the root owning `cpath`.
    pub fn transaction<T>(&self, cpath: &str, body: impl FnOnce(&Root) -> T) -> crate::Result<T> {
        let (root, _) = self.resolve_entry(cpath)?;
        Ok(root.transaction(body))
    }

    fn transfer_request(
        &self,
        mode: TransferMode,
        source_dir: &str,
        target_dir: &str,
        entries: Vec<EntryMapping>,
    ) -> crate::Result<TransferRequest<'_>> {
        let (source_root, source_dir) = self.resolve_entry(source_dir)?;
        let (target_root, target_dir) = self.resolve_entry(target_dir)?;
        Ok(TransferRequest {
            mode,
            source_root,
            source_dir,
            target_root,
            target_dir,
            entries,
        })
    }

    /// Classifies a copy or move without touching anything.
    pub fn dry_run_transfer(
        &self,
        mode: TransferMode,
        source_dir: &str,
        target_dir: &str,
        entries: Vec<EntryMapping>,
    ) -> crate::Result<TransferReport> {
        let req = self.transfer_request(mode, source_dir, target_dir, entries)?;
        let plan = plan_transfer(&req)?;
        Ok(TransferReport::from_plan(&plan, self.messages()))
    }

    /// Classifies and executes a copy or move as one submission.
    pub fn transfer(
        &self,
        mode: TransferMode,
        source_dir: &str,
        target_dir: &str,
        entries: Vec<EntryMapping>,
    ) -> crate::Result<ExecuteResult> {
        let req = self.transfer_request(mode, source_dir, target_dir, entries)?;
        let _guards = lock_pair(req.source_root, req.target_root);
        let plan = plan_transfer(&req)?;
        let report = execute_transfer(&plan)?;
        Ok(report.to_wire(self.messages()))
    }

    pub fn copy(
        &self,
        source_dir: &str,
        target_dir: &str,
        names: &[&str],
    ) -> crate::Result<ExecuteResult> {
        let entries = names.iter().map(|name| EntryMapping::same(*name)).collect();
        self.transfer(TransferMode::Copy, source_dir, target_dir, entries)
    }

    pub fn move_entries(
        &self,
        source_dir: &str,
        target_dir: &str,
        names: &[&str],
    ) -> crate::Result<ExecuteResult> {
        let entries = names.iter().map(|name| EntryMapping::same(*name)).collect();
        self.transfer(TransferMode::Move, source_dir, target_dir, entries)
    }

    fn rename_parts(&self, cpath: &str) -> crate::Result<(String, String)> {
        let normalized = path::normalize(cpath)?;
        let (parent, name) = normalized
            .rsplit_once('/')
            .filter(|(parent, _)| !parent.is_empty())
            .ok_or_else(|| CoreError::permission_denied("a root cannot be renamed"))?;
        Ok((parent.to_string(), name.to_string()))
    }

    pub fn dry_run_rename(&self, cpath: &str, new_name: &str) -> crate::Result<TransferReport> {
        let (parent, name) = self.rename_parts(cpath)?;
        let entries = vec![EntryMapping::renamed(name, new_name)];
        self.dry_run_transfer(TransferMode::Move, &parent, &parent, entries)
    }

    /// Renames one entry in place; classified like a single-entry move.
    pub fn rename(&self, cpath: &str, new_name: &str) -> crate::Result<ExecuteResult> {
        let (parent, name) = self.rename_parts(cpath)?;
        let entries = vec![EntryMapping::renamed(name, new_name)];
        self.transfer(TransferMode::Move, &parent, &parent, entries)
    }

    fn delete_request(&self, dir: &str, names: &[&str], recursive: bool) -> crate::Result<DeleteRequest<'_>> {
        let (root, dir) = self.resolve_entry(dir)?;
        Ok(DeleteRequest {
            root,
            dir,
            names: names.iter().map(|name| name.to_string()).collect(),
            recursive,
        })
    }

    pub fn dry_run_delete(&self, dir: &str, names: &[&str], recursive: bool) -> crate::Result<DeleteReport> {
        let req = self.delete_request(dir, names, recursive)?;
        let plan = plan_delete(&req)?;
        Ok(DeleteReport::from_plan(&plan, self.messages()))
    }

    pub fn delete(&self, dir: &str, names: &[&str], recursive: bool) -> crate::Result<ExecuteResult> {
        let req = self.delete_request(dir, names, recursive)?;
        req.root.transaction(|_| {
            let plan = plan_delete(&req)?;
            let report = execute_delete(&plan)?;
            Ok(report.to_wire(self.messages()))
        })
    }

    /// Streams trash entries last seen in `dir_cpath` (with `name`), or
    /// everything under it when `name` is empty.
    pub fn history(
        &self,
        dir_cpath: &str,
        name: &str,
        dirs_only: bool,
        visit: impl FnMut(&DeletedFileStat) -> Visit,
    ) -> crate::Result<()> {
        let (root, dir) = self.resolve_history(dir_cpath)?;
        root.history(&dir, name, dirs_only, visit)
    }

    /// Every trash entry of the root owning `cpath`, in id order.
    pub fn trash_entries(&self, cpath: &str) -> crate::Result<Vec<DeletedFileStat>> {
        let (root, _) = self.resolve_history(cpath)?;
        let mut entries = Vec::new();
        root.scan_trash(|entry| {
            entries.push(entry.clone());
            Visit::Recurse
        })?;
        Ok(entries)
    }

    pub fn cleanup_trash(
        &self,
        cpath: &str,
        predicate: impl FnMut(&DeletedFileStat) -> bool,
    ) -> crate::Result<TrashSummary> {
        let (root, _) = self.resolve_history(cpath)?;
        root.cleanup_trash(predicate)
    }

    /// Recovers trash entries by id from the root owning `cpath` into
    /// `dest_root` (defaults to the same root). Unknown ids count as failures.
    pub fn recover(
        &self,
        cpath: &str,
        ids: &[u64],
        dest_root: Option<&str>,
    ) -> crate::Result<RecoverCounts> {
        let (root, _) = self.resolve_history(cpath)?;
        let dest = match dest_root {
            Some(name) => self.root(name)?,
            None => root,
        };

        let mut entries = Vec::new();
        let mut missing = 0;
        root.scan_trash(|entry| {
            if ids.contains(&entry.id) {
                entries.push(entry.clone());
            }
            Visit::Recurse
        })?;
        for id in ids {
            if !entries.iter().any(|entry| entry.id == *id) {
                debug!(id, "no such trash entry");
                missing += 1;
            }
        }

        let mut counts = root.recover(dest, &entries)?;
        counts.failure += missing;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn storage(tmp: &TempDir) -> Storage {
        fs::create_dir_all(tmp.path().join("docs/a")).unwrap();
        fs::create_dir_all(tmp.path().join("plain")).unwrap();
        fs::write(tmp.path().join("docs/a/x.txt"), b"x").unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let mut storage = Storage::new();
        storage
            .mount(
                Root::new("docs", tmp.path().join("docs"), Arc::clone(&fs))
                    .unwrap()
                    .with_trash(tmp.path().join("trash-docs"))
                    .unwrap(),
            )
            .unwrap();
        storage
            .mount(Root::new("plain", tmp.path().join("plain"), fs).unwrap())
            .unwrap();
        storage
    }

    #[test]
    fn resolves_cpaths() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        assert!(matches!(storage.resolve("").unwrap(), Resolved::Top));
        assert!(matches!(storage.resolve("/").unwrap(), Resolved::Top));
        match storage.resolve("//docs//a/x.txt").unwrap() {
            Resolved::Entry { root, rpath } => {
                assert_eq!(root.name(), "docs");
                assert_eq!(rpath, "a/x.txt");
            }
            Resolved::Top => panic!("expected entry"),
        }
        assert!(matches!(storage.resolve("/nope/x"), Err(CoreError::NotFound(_))));
        assert!(matches!(storage.resolve("/docs/../plain"), Err(CoreError::PathInvalid(_))));
    }

    #[test]
    fn synthetic_root_lists_mounts() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        let names: Vec<String> = storage.list("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["docs", "plain"]);
    }

    #[test]
    fn duplicate_mount_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut storage = storage(&tmp);
        let again = Root::new("docs", tmp.path().join("plain"), Arc::new(RealFileSystem)).unwrap();
        assert!(matches!(storage.mount(again), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn trash_operations_gated_on_history() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        let err = storage.trash_entries("/plain").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation(_)));
        assert!(storage.trash_entries("/docs").unwrap().is_empty());
    }

    #[test]
    fn rename_of_root_refused() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        assert!(matches!(storage.rename("/docs", "other"), Err(CoreError::PermissionDenied(_))));
    }

    #[test]
    fn recover_counts_unknown_ids() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        storage.delete("/docs/a", &["x.txt"], false).unwrap();
        let id = storage.trash_entries("/docs").unwrap()[0].id;
        let counts = storage.recover("/docs", &[id, id + 100], None).unwrap();
        assert_eq!(counts, RecoverCounts { success: 1, failure: 1 });
        assert!(tmp.path().join("docs/a/x.txt").exists());
    }
}

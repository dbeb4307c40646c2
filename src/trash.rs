//! Per-root trash store.
//!
//! Layout under the trash directory:
//!
//! - `files/<id>`: payload of a soft-deleted file (directories have none)
//! - `info/<id>.trashinfo`: freedesktop-style key=value metadata
//! - `next-id`: persisted value of the id counter
//!
//! Ids are allocated by a counter owned by the store, so two roots never
//! share a sequence.

use crate::errors::CoreError;
use crate::fs::{move_file, FileSystem};
use crate::helpers::{
    datetime_from_millis, parse_trash_datetime, serialize_trash_datetime, TRASHINFO_EXTENSION,
};
use crate::models::{DeletedFileStat, Stat, TrashSummary, Visit};
use crate::path;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const INFO_HEADER: &str = "[Trash Info]";
const COUNTER_FILE: &str = "next-id";

/// Monotonic id source for one trash store.
#[derive(Debug)]
pub struct IdCounter {
    next: AtomicU64,
    file: PathBuf,
}

impl IdCounter {
    fn open(fs: &dyn FileSystem, file: PathBuf, floor: u64) -> Self {
        let stored = fs
            .read_to_string(&file)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .unwrap_or(1);
        Self {
            next: AtomicU64::new(stored.max(floor).max(1)),
            file,
        }
    }

    fn allocate(&self, fs: &dyn FileSystem) -> crate::Result<u64> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        fs.write(&self.file, (id + 1).to_string().as_bytes())?;
        Ok(id)
    }

    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

pub struct TrashStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    counter: IdCounter,
}

impl std::fmt::Debug for TrashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashStore")
            .field("dir", &self.dir)
            .field("next_id", &self.counter.peek())
            .finish()
    }
}

impl TrashStore {
    /// Opens (creating if needed) the trash rooted at `dir`.
    pub fn open(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let dir = dir.into();
        fs.create_dir_all(&dir.join("files"))?;
        fs.create_dir_all(&dir.join("info"))?;

        let highest = fs
            .list_dir(&dir.join("info"))?
            .iter()
            .filter_map(|name| id_from_info_name(name))
            .max()
            .unwrap_or(0);
        let counter = IdCounter::open(fs.as_ref(), dir.join(COUNTER_FILE), highest + 1);
        Ok(Self { dir, fs, counter })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn payload_path(&self, id: u64) -> PathBuf {
        self.dir.join("files").join(id.to_string())
    }

    fn info_path(&self, id: u64) -> PathBuf {
        self.dir
            .join("info")
            .join(format!("{id}{TRASHINFO_EXTENSION}"))
    }

    /// Soft-deletes `physical`, which lives at `rpath` inside the root.
    ///
    /// Files are moved into the store. Directories must already be empty;
    /// they are recorded and then removed.
    pub fn put(&self, physical: &Path, rpath: &str, stat: Stat) -> crate::Result<DeletedFileStat> {
        let (dir, name) = path::split_parent(rpath)
            .ok_or_else(|| CoreError::permission_denied("the root itself cannot be trashed"))?;
        let id = self.counter.allocate(self.fs.as_ref())?;
        let entry = DeletedFileStat {
            id,
            dir: dir.to_string(),
            name: name.to_string(),
            stat,
            last_deleted: DateTime::<Utc>::from(self.fs.now()),
        };

        if stat.is_dir {
            self.write_info(&entry)?;
            if let Err(err) = self.fs.remove_dir(physical) {
                if let Err(undo) = self.fs.remove_file(&self.info_path(id)) {
                    warn!(id, rpath, error = %undo, "stale trash info left behind");
                }
                return Err(err);
            }
        } else {
            move_file(self.fs.as_ref(), physical, &self.payload_path(id))?;
            if let Err(err) = self.write_info(&entry) {
                // Put the payload back so the file is not orphaned.
                if let Err(undo) = move_file(self.fs.as_ref(), &self.payload_path(id), physical) {
                    warn!(id, rpath, error = %undo, "payload left in trash without info");
                }
                return Err(err);
            }
        }
        debug!(id, rpath, "moved to trash");
        Ok(entry)
    }

    fn write_info(&self, entry: &DeletedFileStat) -> crate::Result<()> {
        self.fs.write(&self.info_path(entry.id), format_info(entry).as_bytes())
    }

    /// Reads one entry by id.
    pub fn get(&self, id: u64) -> crate::Result<Option<DeletedFileStat>> {
        let info = self.info_path(id);
        if !self.fs.exists(&info) {
            return Ok(None);
        }
        let text = self.fs.read_to_string(&info)?;
        parse_info(id, &text)
            .map(Some)
            .ok_or_else(|| CoreError::invalid_input(format!("unparsable trash entry {id}")))
    }

    /// Visits every entry in id order. Unparsable entries are skipped.
    pub fn scan(&self, mut visit: impl FnMut(&DeletedFileStat) -> Visit) -> crate::Result<()> {
        let info_dir = self.dir.join("info");
        let mut ids: Vec<u64> = self
            .fs
            .list_dir(&info_dir)?
            .iter()
            .filter_map(|name| id_from_info_name(name))
            .collect();
        ids.sort_unstable();

        for id in ids {
            let entry = match self.get(id) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(err) => {
                    warn!(id, error = %err, "skipping trash entry");
                    continue;
                }
            };
            if visit(&entry) == Visit::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Streams entries last seen at `dir`/`name`, or every entry at or below
    /// `dir` when `name` is empty.
    pub fn history(
        &self,
        dir: &str,
        name: &str,
        dirs_only: bool,
        mut visit: impl FnMut(&DeletedFileStat) -> Visit,
    ) -> crate::Result<()> {
        let dir = dir.trim_matches('/');
        self.scan(|entry| {
            if dirs_only && !entry.is_dir() {
                return Visit::Skip;
            }
            let matched = if name.is_empty() {
                path::is_within(&entry.dir, dir)
            } else {
                entry.dir == dir && entry.name == name
            };
            if matched {
                visit(entry)
            } else {
                Visit::Skip
            }
        })
    }

    /// Removes every entry the predicate selects and reports what went.
    pub fn cleanup(
        &self,
        mut predicate: impl FnMut(&DeletedFileStat) -> bool,
    ) -> crate::Result<TrashSummary> {
        let mut selected = Vec::new();
        self.scan(|entry| {
            if predicate(entry) {
                selected.push(entry.clone());
            }
            Visit::Recurse
        })?;

        let mut summary = TrashSummary::default();
        for entry in selected {
            match self.purge(&entry) {
                Ok(()) => summary.add(&entry),
                Err(err) => warn!(id = entry.id, error = %err, "failed to purge trash entry"),
            }
        }
        Ok(summary)
    }

    fn purge(&self, entry: &DeletedFileStat) -> crate::Result<()> {
        let payload = self.payload_path(entry.id);
        if !entry.is_dir() && self.fs.exists(&payload) {
            self.fs.remove_file(&payload)?;
        }
        self.fs.remove_file(&self.info_path(entry.id))
    }

    /// Re-creates `entry` at `target` and drops it from the store.
    pub fn restore(&self, entry: &DeletedFileStat, target: &Path) -> crate::Result<()> {
        if entry.is_dir() {
            match self.fs.symlink_metadata(target) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(CoreError::conflict(format!(
                        "{} exists and is not a directory",
                        target.display()
                    )))
                }
                Err(_) => self.fs.create_dir_all(target)?,
            }
        } else {
            if self.fs.exists(target) {
                return Err(CoreError::conflict(format!(
                    "{} already exists",
                    target.display()
                )));
            }
            let payload = self.payload_path(entry.id);
            if !self.fs.exists(&payload) {
                return Err(CoreError::not_found(format!("payload of trash entry {}", entry.id)));
            }
            if let Some(parent) = target.parent() {
                self.fs.create_dir_all(parent)?;
            }
            move_file(self.fs.as_ref(), &payload, target)?;
        }
        self.fs.remove_file(&self.info_path(entry.id))?;
        debug!(id = entry.id, target = %target.display(), "restored from trash");
        Ok(())
    }
}

fn id_from_info_name(name: &str) -> Option<u64> {
    name.strip_suffix(TRASHINFO_EXTENSION)?.parse().ok()
}

fn format_info(entry: &DeletedFileStat) -> String {
    format!(
        "{INFO_HEADER}\nPath={}\nDeletionDate={}\nId={}\nKind={}\nSize={}\nLastModified={}\n",
        urlencoding::encode(&entry.rpath()),
        serialize_trash_datetime(entry.last_deleted),
        entry.id,
        if entry.is_dir() { "dir" } else { "file" },
        entry.stat.length,
        entry.stat.last_modified,
    )
}

fn parse_info(fallback_id: u64, contents: &str) -> Option<DeletedFileStat> {
    let mut lines = contents.lines();
    if lines.next()?.trim() != INFO_HEADER {
        return None;
    }
    let mut rpath = None;
    let mut deleted = None;
    let mut id = fallback_id;
    let mut is_dir = false;
    let mut length = 0u64;
    let mut last_modified = 0i64;

    for line in lines {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "Path" => rpath = urlencoding::decode(value).ok().map(|v| v.into_owned()),
            "DeletionDate" => deleted = parse_trash_datetime(value),
            "Id" => id = value.parse().ok()?,
            "Kind" => is_dir = value == "dir",
            "Size" => length = value.parse().unwrap_or(0),
            "LastModified" => last_modified = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    let rpath = rpath?;
    let (dir, name) = path::split_parent(&rpath)?;
    Some(DeletedFileStat {
        id,
        dir: dir.to_string(),
        name: name.to_string(),
        stat: Stat {
            is_file: !is_dir,
            is_dir,
            length,
            last_modified,
            readable: true,
            writable: true,
        },
        last_deleted: deleted.unwrap_or_else(|| datetime_from_millis(0)),
    })
}

/// Predicate builders for [`TrashStore::cleanup`].
pub mod purge {
    use crate::models::DeletedFileStat;
    use crate::path;
    use chrono::{DateTime, Utc};

    pub fn all() -> impl FnMut(&DeletedFileStat) -> bool {
        |_| true
    }

    pub fn by_id(id: u64) -> impl FnMut(&DeletedFileStat) -> bool {
        move |entry| entry.id == id
    }

    pub fn by_location(dir: &str, name: &str) -> impl FnMut(&DeletedFileStat) -> bool {
        let dir = dir.trim_matches('/').to_string();
        let name = name.to_string();
        move |entry| entry.dir == dir && entry.name == name
    }

    /// Everything deleted at or below `prefix`, including `prefix` itself.
    pub fn under(prefix: &str) -> impl FnMut(&DeletedFileStat) -> bool {
        let prefix = prefix.trim_matches('/').to_string();
        move |entry| path::is_within(&entry.rpath(), &prefix)
    }

    pub fn older_than(cutoff: DateTime<Utc>) -> impl FnMut(&DeletedFileStat) -> bool {
        move |entry| entry.last_deleted < cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TrashStore, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("live");
        fs::create_dir_all(&live).unwrap();
        let store = TrashStore::open(Arc::new(RealFileSystem), tmp.path().join("trash")).unwrap();
        (tmp, store, live)
    }

    fn stat_of(path: &Path) -> Stat {
        Stat::from_metadata(&fs::metadata(path).unwrap(), false)
    }

    #[test]
    fn put_allocates_fresh_ids_and_moves_payload() {
        let (_tmp, store, live) = setup();
        fs::write(live.join("a.txt"), b"one").unwrap();
        fs::write(live.join("b.txt"), b"two").unwrap();

        let a = store.put(&live.join("a.txt"), "a.txt", stat_of(&live.join("a.txt"))).unwrap();
        let b = store.put(&live.join("b.txt"), "b.txt", stat_of(&live.join("b.txt"))).unwrap();

        assert!(b.id > a.id);
        assert!(!live.join("a.txt").exists());
        assert_eq!(fs::read(store.payload_path(a.id)).unwrap(), b"one");
    }

    #[test]
    fn failed_info_write_returns_payload() {
        let (_tmp, store, live) = setup();
        fs::write(live.join("a.txt"), b"one").unwrap();
        // A directory squatting on the info path makes the write fail.
        let id = store.counter.peek();
        fs::create_dir_all(store.info_path(id)).unwrap();

        assert!(store.put(&live.join("a.txt"), "a.txt", stat_of(&live.join("a.txt"))).is_err());
        assert_eq!(fs::read(live.join("a.txt")).unwrap(), b"one");
        assert!(!store.payload_path(id).exists());
    }

    #[test]
    fn counter_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("f");
        fs::write(&live, b"x").unwrap();
        let first_id = {
            let store = TrashStore::open(Arc::new(RealFileSystem), tmp.path().join("t")).unwrap();
            store.put(&live, "f", stat_of(&live)).unwrap().id
        };
        let store = TrashStore::open(Arc::new(RealFileSystem), tmp.path().join("t")).unwrap();
        assert!(store.counter.peek() > first_id);
    }

    #[test]
    fn info_round_trips_through_parser() {
        let (_tmp, store, live) = setup();
        fs::create_dir_all(live.join("sub dir")).unwrap();
        fs::write(live.join("sub dir/n%me.txt"), b"abc").unwrap();
        let path = live.join("sub dir/n%me.txt");
        let entry = store.put(&path, "sub dir/n%me.txt", stat_of(&path)).unwrap();

        let loaded = store.get(entry.id).unwrap().unwrap();
        assert_eq!(loaded.dir, "sub dir");
        assert_eq!(loaded.name, "n%me.txt");
        assert_eq!(loaded.stat.length, 3);
        assert_eq!(
            loaded.last_deleted.timestamp_millis(),
            entry.last_deleted.timestamp_millis()
        );
    }

    #[test]
    fn broken_info_files_are_skipped() {
        let (_tmp, store, live) = setup();
        fs::write(store.dir().join("info/999.trashinfo"), "garbage").unwrap();
        fs::write(live.join("ok.txt"), b"ok").unwrap();
        store.put(&live.join("ok.txt"), "ok.txt", stat_of(&live.join("ok.txt"))).unwrap();

        let mut seen = Vec::new();
        store
            .scan(|entry| {
                seen.push(entry.name.clone());
                Visit::Recurse
            })
            .unwrap();
        assert_eq!(seen, vec!["ok.txt"]);
    }

    #[test]
    fn cleanup_reports_summary() {
        let (_tmp, store, live) = setup();
        fs::create_dir_all(live.join("d")).unwrap();
        fs::write(live.join("d/f1"), b"12345").unwrap();
        store.put(&live.join("d/f1"), "d/f1", stat_of(&live.join("d/f1"))).unwrap();
        store.put(&live.join("d"), "d", stat_of(&live.join("d"))).unwrap();

        let summary = store.cleanup(purge::under("d")).unwrap();
        assert_eq!(
            summary,
            TrashSummary {
                files: 1,
                dirs: 1,
                total_size: 5
            }
        );
        let mut count = 0;
        store
            .scan(|_| {
                count += 1;
                Visit::Recurse
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn restore_refuses_to_clobber() {
        let (_tmp, store, live) = setup();
        fs::write(live.join("x"), b"old").unwrap();
        let entry = store.put(&live.join("x"), "x", stat_of(&live.join("x"))).unwrap();
        fs::write(live.join("x"), b"new").unwrap();

        let err = store.restore(&entry, &live.join("x")).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(fs::read(live.join("x")).unwrap(), b"new");
        assert!(store.get(entry.id).unwrap().is_some());
    }

    #[test]
    fn history_point_lookup_and_subtree() {
        let (_tmp, store, live) = setup();
        fs::create_dir_all(live.join("a/b")).unwrap();
        for rpath in ["a/x", "a/b/y", "z"] {
            let p = live.join(rpath);
            fs::write(&p, b"-").unwrap();
            store.put(&p, rpath, stat_of(&p)).unwrap();
        }

        let mut names = Vec::new();
        store
            .history("a", "x", false, |e| {
                names.push(e.rpath());
                Visit::Recurse
            })
            .unwrap();
        assert_eq!(names, vec!["a/x"]);

        names.clear();
        store
            .history("/a", "", false, |e| {
                names.push(e.rpath());
                Visit::Recurse
            })
            .unwrap();
        assert_eq!(names, vec!["a/x", "a/b/y"]);

        names.clear();
        store
            .history("a", "", true, |e| {
                names.push(e.rpath());
                Visit::Recurse
            })
            .unwrap();
        assert!(names.is_empty());
    }
}

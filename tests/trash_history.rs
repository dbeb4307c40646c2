use chrono::{Duration, Utc};
use docvfs_core::prelude::*;
use docvfs_core::Root;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (TempDir, Storage) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("a/deep")).unwrap();
    fs::write(docs.join("a/x.txt"), "ex").unwrap();
    fs::write(docs.join("a/deep/z.txt"), "zed").unwrap();
    fs::create_dir_all(tmp.path().join("spare")).unwrap();

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let mut storage = Storage::new();
    storage
        .mount(
            Root::new("docs", &docs, Arc::clone(&fs))
                .unwrap()
                .with_trash(tmp.path().join("trash"))
                .unwrap(),
        )
        .unwrap();
    storage
        .mount(Root::new("spare", tmp.path().join("spare"), fs).unwrap())
        .unwrap();
    (tmp, storage)
}

fn history(storage: &Storage, dir: &str, name: &str) -> Vec<DeletedFileStat> {
    let mut found = Vec::new();
    storage
        .history(dir, name, false, |entry| {
            found.push(entry.clone());
            Visit::Recurse
        })
        .unwrap();
    found
}

#[test]
fn delete_records_one_entry_per_file() {
    let (_tmp, storage) = setup();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();

    let entries = history(&storage, "/docs/a", "x.txt");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].dir, "a");
    assert_eq!(entries[0].name, "x.txt");
    assert_eq!(entries[0].stat.length, 2);
    assert!(entries[0].last_deleted <= Utc::now());
}

#[test]
fn ids_are_fresh_and_monotonic() {
    let (tmp, storage) = setup();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();
    fs::write(tmp.path().join("docs/a/x.txt"), "again").unwrap();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();

    let entries = history(&storage, "/docs/a", "x.txt");
    assert_eq!(entries.len(), 2);
    assert!(entries[1].id > entries[0].id);
}

#[test]
fn round_trip_restores_content_and_forgets_entry() {
    let (tmp, storage) = setup();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();
    let id = history(&storage, "/docs/a", "x.txt")[0].id;

    let counts = storage.recover("/docs", &[id], None).unwrap();
    assert_eq!(counts, RecoverCounts { success: 1, failure: 0 });
    assert_eq!(fs::read_to_string(tmp.path().join("docs/a/x.txt")).unwrap(), "ex");
    assert!(storage.trash_entries("/docs").unwrap().is_empty());
}

#[test]
fn history_under_directory_includes_descendants() {
    let (_tmp, storage) = setup();
    storage.delete("/docs", &["a"], true).unwrap();

    let under_a: Vec<String> = history(&storage, "/docs/a", "")
        .iter()
        .map(DeletedFileStat::rpath)
        .collect();
    assert_eq!(under_a, vec!["a/x.txt", "a/deep/z.txt", "a/deep"]);

    let mut dirs = Vec::new();
    storage
        .history("/docs", "", true, |entry| {
            dirs.push(entry.rpath());
            Visit::Recurse
        })
        .unwrap();
    assert_eq!(dirs, vec!["a/deep", "a"]);
}

#[test]
fn history_visitor_can_stop_early() {
    let (_tmp, storage) = setup();
    storage.delete("/docs", &["a"], true).unwrap();
    let mut seen = 0;
    storage
        .history("/docs", "", false, |_| {
            seen += 1;
            Visit::Stop
        })
        .unwrap();
    assert_eq!(seen, 1);
}

#[test]
fn recover_subtree_rebuilds_directories_first() {
    let (tmp, storage) = setup();
    storage.delete("/docs", &["a"], true).unwrap();
    assert!(!tmp.path().join("docs/a").exists());

    let ids: Vec<u64> = storage.trash_entries("/docs").unwrap().iter().map(|e| e.id).collect();
    let counts = storage.recover("/docs", &ids, None).unwrap();
    assert_eq!(counts.failure, 0);
    assert_eq!(counts.success, 4);
    assert_eq!(fs::read_to_string(tmp.path().join("docs/a/deep/z.txt")).unwrap(), "zed");
}

#[test]
fn recover_into_another_root() {
    let (tmp, storage) = setup();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();
    let id = history(&storage, "/docs/a", "x.txt")[0].id;

    let counts = storage.recover("/docs", &[id], Some("spare")).unwrap();
    assert_eq!(counts.success, 1);
    assert_eq!(fs::read_to_string(tmp.path().join("spare/a/x.txt")).unwrap(), "ex");
}

#[test]
fn cleanup_predicates_share_one_primitive() {
    let (tmp, storage) = setup();
    storage.delete("/docs", &["a"], true).unwrap();
    fs::write(tmp.path().join("docs/top.txt"), "top!").unwrap();
    storage.delete("/docs", &["top.txt"], false).unwrap();

    let z = history(&storage, "/docs/a/deep", "z.txt")[0].id;
    let summary = storage.cleanup_trash("/docs", purge::by_id(z)).unwrap();
    assert_eq!(summary, TrashSummary { files: 1, dirs: 0, total_size: 3 });

    let summary = storage.cleanup_trash("/docs", purge::under("a")).unwrap();
    assert_eq!(summary, TrashSummary { files: 1, dirs: 2, total_size: 2 });

    let summary = storage
        .cleanup_trash("/docs", purge::older_than(Utc::now() - Duration::days(1)))
        .unwrap();
    assert_eq!(summary, TrashSummary::default());

    let summary = storage
        .cleanup_trash("/docs", purge::by_location("", "top.txt"))
        .unwrap();
    assert_eq!(summary.files, 1);
    assert!(storage.trash_entries("/docs").unwrap().is_empty());
}

#[test]
fn unparsable_entries_do_not_block_listing() {
    let (tmp, storage) = setup();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();
    fs::write(tmp.path().join("trash/info/999.trashinfo"), "garbage").unwrap();

    assert_eq!(storage.trash_entries("/docs").unwrap().len(), 1);
    let summary = storage.cleanup_trash("/docs", purge::all()).unwrap();
    assert_eq!(summary.files, 1);
}

#[test]
fn plain_roots_have_no_history() {
    let (_tmp, storage) = setup();
    let err = storage.history("/spare", "", false, |_| Visit::Recurse).unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedOperation(_)));
    assert!(storage.recover("/spare", &[1], None).is_err());
}

#[test]
fn id_counter_survives_remount() {
    let (tmp, storage) = setup();
    storage.delete("/docs/a", &["x.txt"], false).unwrap();
    let first = storage.trash_entries("/docs").unwrap()[0].id;
    storage.cleanup_trash("/docs", purge::all()).unwrap();
    drop(storage);

    let root = Root::new("docs", tmp.path().join("docs"), Arc::new(RealFileSystem))
        .unwrap()
        .with_trash(tmp.path().join("trash"))
        .unwrap();
    let mut storage = Storage::new();
    storage.mount(root).unwrap();
    storage.delete("/docs/a/deep", &["z.txt"], false).unwrap();
    assert!(storage.trash_entries("/docs").unwrap()[0].id > first);
}

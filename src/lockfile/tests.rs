use std::{fs, path::PathBuf};

use tempfile::TempDir;

use crate::{
    error::Error,
    lockfile::{sync_dir, write_atomically, LockFile, LockStatus},
    manifest::{EntryKind, Manifest, ManifestEntry, StorageClass},
};

fn entry(key: &str) -> ManifestEntry {
    ManifestEntry {
        source: PathBuf::from(format!("/src/{key}")),
        target_key: key.to_owned(),
        storage_class: StorageClass::Standard,
        force: false,
        kind: EntryKind::File,
    }
}

#[test]
fn path_for_appends_suffix() {
    assert_eq!(
        LockFile::path_for("backups/manifest.csv".as_ref()),
        PathBuf::from("backups/manifest.csv.lock")
    );
}

#[tokio::test]
async fn load_missing_is_empty() {
    let dir = TempDir::new().unwrap();
    let lock_file = LockFile::load(dir.path().join("m.csv.lock")).await.unwrap();
    assert!(lock_file.is_empty());
    assert!(!lock_file.is_frozen("anything"));
}

#[tokio::test]
async fn mark_frozen_survives_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");

    let mut lock_file = LockFile::load(path.clone()).await.unwrap();
    lock_file.mark_frozen(&entry("root/a.txt")).await.unwrap();
    assert!(lock_file.is_frozen("root/a.txt"));
    drop(lock_file);

    let reloaded = LockFile::load(path).await.unwrap();
    assert!(reloaded.is_frozen("root/a.txt"));
    assert!(!reloaded.is_frozen("root/b.txt"));

    let record = reloaded.get("root/a.txt").unwrap();
    assert_eq!(record.status, LockStatus::Frozen);
    assert_eq!(record.storage_class, Some(StorageClass::Standard));
    assert_eq!(record.source, Some(PathBuf::from("/src/root/a.txt")));
    assert!(record.frozen_at.is_some());
}

#[tokio::test]
async fn mark_frozen_keeps_existing_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");

    let mut lock_file = LockFile::load(path.clone()).await.unwrap();
    lock_file.mark_frozen(&entry("a")).await.unwrap();
    lock_file.mark_frozen(&entry("b")).await.unwrap();
    lock_file.mark_frozen(&entry("a")).await.unwrap();

    let reloaded = LockFile::load(path).await.unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.is_frozen("a"));
    assert!(reloaded.is_frozen("b"));
}

#[tokio::test]
async fn mark_frozen_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");

    let mut lock_file = LockFile::load(path).await.unwrap();
    lock_file.mark_frozen(&entry("a")).await.unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["m.csv.lock"]);
}

#[test]
fn write_atomically_replaces_contents_and_syncs_dir() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");
    fs::write(&path, "old").unwrap();

    write_atomically(&path, b"new").unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"new");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[cfg(unix)]
#[test]
fn sync_dir_missing_error() {
    let dir = TempDir::new().unwrap();
    assert!(sync_dir(dir.path()).is_ok());
    assert!(sync_dir(&dir.path().join("missing")).is_err());
}

#[tokio::test]
async fn mark_frozen_failure_rolls_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing-dir").join("m.csv.lock");

    let mut lock_file = LockFile::load(path).await.unwrap();
    assert!(lock_file.mark_frozen(&entry("a")).await.is_err());
    assert!(!lock_file.is_frozen("a"));
}

#[tokio::test]
async fn pending_record_is_not_frozen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");
    fs::write(
        &path,
        r#"{"version": 1, "records": {"a": {"status": "PENDING"}, "b": {"status": "FROZEN"}}}"#,
    )
    .unwrap();

    let lock_file = LockFile::load(path).await.unwrap();
    assert!(!lock_file.is_frozen("a"));
    assert!(lock_file.is_frozen("b"));
}

#[tokio::test]
async fn load_garbage_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");
    fs::write(&path, "root/a.txt,a.txt,20-frozen\n").unwrap();

    let err = LockFile::load(path.clone()).await.unwrap_err();
    assert!(matches!(err, Error::LockStoreCorrupt { path: ref p, .. } if *p == path));
}

#[tokio::test]
async fn load_unknown_status_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");
    fs::write(&path, r#"{"version": 1, "records": {"a": {"status": "MELTED"}}}"#).unwrap();

    let err = LockFile::load(path).await.unwrap_err();
    assert!(matches!(err, Error::LockStoreCorrupt { .. }));
}

#[tokio::test]
async fn load_unknown_version_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");
    fs::write(&path, r#"{"version": 9, "records": {}}"#).unwrap();

    let err = LockFile::load(path).await.unwrap_err();
    assert!(matches!(err, Error::LockStoreCorrupt { ref reason, .. } if reason.contains('9')));
}

#[tokio::test]
async fn orphans_lists_keys_missing_from_manifest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.csv.lock");

    let mut lock_file = LockFile::load(path).await.unwrap();
    lock_file.mark_frozen(&entry("kept")).await.unwrap();
    lock_file.mark_frozen(&entry("dropped")).await.unwrap();

    let manifest = Manifest::parse("x,kept", dir.path()).unwrap();
    let orphans: Vec<_> = lock_file.orphans(&manifest).map(|(key, _)| key).collect();
    assert_eq!(orphans, vec!["dropped"]);
}

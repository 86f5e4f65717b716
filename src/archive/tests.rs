use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::{
    archive::{archive_name, Archiver, DEFAULT_COMPRESSION_LEVEL},
    error::Error,
};

fn create_source() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("dir1");
    fs::create_dir_all(root.join("nested/deeper")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("a.txt"), "alpha").unwrap();
    fs::write(root.join("nested/b.bin"), [0u8, 1, 2, 255, 254]).unwrap();
    fs::write(root.join("nested/deeper/c.txt"), "x".repeat(100_000)).unwrap();
    dir
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry.path().strip_prefix(root).unwrap().to_owned();
            let contents = entry
                .file_type()
                .is_file()
                .then(|| fs::read(entry.path()).unwrap());
            (relative, contents)
        })
        .collect()
}

fn archiver(scratch: &Path) -> Archiver {
    Archiver::new(scratch.to_owned(), DEFAULT_COMPRESSION_LEVEL)
}

#[test]
fn archive_name_uses_last_key_component() {
    assert_eq!(archive_name("bundle.tar.gz"), "bundle.tar.gz");
    assert_eq!(archive_name("root/photos/2020.tar.gz"), "2020.tar.gz");
    assert_eq!(archive_name("weird/"), "archive.tar.gz");
}

#[tokio::test]
async fn archive_roundtrip_reproduces_directory() {
    let source = create_source();
    let scratch = TempDir::new().unwrap();
    let source_dir = source.path().join("dir1");

    let archived = archiver(scratch.path())
        .archive(&source_dir, "backups/bundle.tar.gz")
        .await
        .unwrap();

    assert_eq!(archived.path().file_name().unwrap(), "bundle.tar.gz");
    assert_eq!(archived.file_count(), 3);
    assert_eq!(archived.size(), fs::metadata(archived.path()).unwrap().len());

    let extract_dir = TempDir::new().unwrap();
    let decoder = GzDecoder::new(File::open(archived.path()).unwrap());
    tar::Archive::new(decoder).unpack(extract_dir.path()).unwrap();

    assert_eq!(
        snapshot(&extract_dir.path().join("dir1")),
        snapshot(&source_dir)
    );
}

#[tokio::test]
async fn archive_entries_are_sorted() {
    let source = create_source();
    let scratch = TempDir::new().unwrap();

    let archived = archiver(scratch.path())
        .archive(&source.path().join("dir1"), "bundle.tar.gz")
        .await
        .unwrap();

    let decoder = GzDecoder::new(File::open(archived.path()).unwrap());
    let mut archive = tar::Archive::new(decoder);
    let names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_owned()
        })
        .collect();

    assert_eq!(
        names,
        vec![
            "dir1",
            "dir1/a.txt",
            "dir1/empty",
            "dir1/nested",
            "dir1/nested/b.bin",
            "dir1/nested/deeper",
            "dir1/nested/deeper/c.txt",
        ]
    );
}

#[tokio::test]
async fn archive_leaves_nothing_behind_when_dropped() {
    let source = create_source();
    let scratch = TempDir::new().unwrap();

    let archived = archiver(scratch.path())
        .archive(&source.path().join("dir1"), "bundle.tar.gz")
        .await
        .unwrap();

    let parent = archived.path().parent().unwrap().to_owned();
    let names: Vec<_> = fs::read_dir(&parent)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["bundle.tar.gz"]);

    drop(archived);
    assert!(!parent.exists());
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn archive_missing_source_error() {
    let scratch = TempDir::new().unwrap();
    let err = archiver(scratch.path())
        .archive(&scratch.path().join("nope"), "nope.tar.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Archive { .. }));
}

#[tokio::test]
async fn archive_file_source_error() {
    let scratch = TempDir::new().unwrap();
    let file = scratch.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    let err = archiver(scratch.path())
        .archive(&file, "plain.tar.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Archive { ref path, .. } if *path == file));
}

#[tokio::test]
async fn archive_missing_scratch_dir_error() {
    let source = create_source();
    let scratch = source.path().join("no-such-scratch");

    let err = archiver(&scratch)
        .archive(&source.path().join("dir1"), "bundle.tar.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Archive { .. }));
}

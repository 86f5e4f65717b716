//! Packs a directory into a `.tar.gz` in a scratch directory so it can be
//! uploaded as a single object.
//!
//! The archive is written under a `.partial` name and only renamed to its
//! final name once the gzip stream is finished and synced, so a reader never
//! sees a truncated archive. The scratch directory holding it is removed when
//! the returned [`ArchivedDirectory`] is dropped.

#[cfg(test)]
mod tests;

use std::{
    ffi::OsString,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use log::warn;
use tempfile::TempDir;
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    format::format_path,
};

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const TEMP_PREFIX: &str = ".freezeomatic-";
const PARTIAL_SUFFIX: &str = ".partial";
const FALLBACK_NAME: &str = "archive.tar.gz";

#[derive(Debug, Clone)]
pub struct Archiver {
    scratch_dir: PathBuf,
    compression_level: u32,
}

#[derive(Debug)]
pub struct ArchivedDirectory {
    path: PathBuf,
    size: u64,
    file_count: u64,
    _dir: TempDir,
}

impl ArchivedDirectory {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_count(&self) -> u64 {
        self.file_count
    }
}

impl Archiver {
    pub fn new(scratch_dir: PathBuf, compression_level: u32) -> Self {
        Archiver {
            scratch_dir,
            compression_level: compression_level.clamp(1, 9),
        }
    }

    /// Archives `source` into a fresh scratch directory, naming the file after
    /// the last component of `target_key`.
    pub async fn archive(&self, source: &Path, target_key: &str) -> Result<ArchivedDirectory> {
        let source = source.to_owned();
        let scratch_dir = self.scratch_dir.clone();
        let name = archive_name(target_key);
        let level = self.compression_level;

        let error_path = source.clone();
        spawn_blocking(move || build(&source, &scratch_dir, &name, level))
            .await
            .map_err(|err| Error::archive(error_path, err))?
    }
}

fn archive_name(target_key: &str) -> String {
    target_key
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_owned()
}

fn build(source: &Path, scratch_dir: &Path, name: &str, level: u32) -> Result<ArchivedDirectory> {
    try_build(source, scratch_dir, name, level).map_err(|err| match err {
        Error::Archive { .. } => err,
        err => Error::archive(source, err),
    })
}

fn try_build(
    source: &Path,
    scratch_dir: &Path,
    name: &str,
    level: u32,
) -> Result<ArchivedDirectory> {
    if !fs::metadata(source)?.is_dir() {
        return Err(Error::archive(source, "not a directory"));
    }

    let root_name = source
        .file_name()
        .map_or_else(|| OsString::from("root"), ToOwned::to_owned);

    let dir = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir_in(scratch_dir)?;
    let partial_path = dir.path().join(format!("{name}{PARTIAL_SUFFIX}"));
    let file = File::create(&partial_path)?;

    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut file_count = 0;
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative_path = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| Error::archive(entry.path(), err))?;
        let archive_path = Path::new(&root_name).join(relative_path);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            builder.append_dir(&archive_path, entry.path())?;
        } else if file_type.is_file() || file_type.is_symlink() {
            builder.append_path_with_name(entry.path(), &archive_path)?;
            file_count += 1;
        } else {
            warn!("skipped special file {}", format_path(entry.path()));
        }
    }

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    let size = file.metadata()?.len();
    drop(file);

    let path = dir.path().join(name);
    fs::rename(&partial_path, &path)?;

    Ok(ArchivedDirectory {
        path,
        size,
        file_count,
        _dir: dir,
    })
}

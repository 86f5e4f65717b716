//! The lock file: a durable record of which target keys have been frozen.
//!
//! It lives next to the manifest (`<manifest>.lock`) as pretty-printed JSON
//! and is rewritten in full, via a temp file and a rename, after every
//! successful upload.

#[cfg(test)]
mod tests;

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::task::spawn_blocking;

use crate::{
    error::{Error, Result},
    manifest::{Manifest, ManifestEntry, StorageClass},
};

pub const LOCK_SUFFIX: &str = ".lock";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    Pending,
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub status: LockStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<StorageClass>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
}

impl LockRecord {
    pub fn frozen(entry: &ManifestEntry, frozen_at: DateTime<Utc>) -> Self {
        LockRecord {
            status: LockStatus::Frozen,
            source: Some(entry.source.clone()),
            storage_class: Some(entry.storage_class),
            frozen_at: Some(frozen_at),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.status == LockStatus::Frozen
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Contents {
    version: u32,
    records: BTreeMap<String, LockRecord>,
}

#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    records: BTreeMap<String, LockRecord>,
}

impl LockFile {
    /// The lock file path for a manifest: the manifest path plus `.lock`.
    pub fn path_for(manifest_path: &Path) -> PathBuf {
        let mut path = OsString::from(manifest_path.as_os_str());
        path.push(LOCK_SUFFIX);
        PathBuf::from(path)
    }

    /// Loads the lock file at `path`. A missing file is an empty lock file; an
    /// unreadable one is `Error::LockStoreCorrupt`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(LockFile { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, target_key: &str) -> Option<&LockRecord> {
        self.records.get(target_key)
    }

    pub fn is_frozen(&self, target_key: &str) -> bool {
        self.get(target_key).is_some_and(LockRecord::is_frozen)
    }

    /// Records `entry` as frozen and persists the whole lock file before
    /// returning. If persisting fails the in-memory state is rolled back.
    pub async fn mark_frozen(&mut self, entry: &ManifestEntry) -> Result<()> {
        let key = entry.target_key.clone();
        let record = LockRecord::frozen(entry, Utc::now());
        let previous = self.records.insert(key.clone(), record);

        if let Err(err) = self.persist().await {
            match previous {
                Some(record) => self.records.insert(key, record),
                None => self.records.remove(&key),
            };
            return Err(err);
        }

        Ok(())
    }

    /// Records whose target key no longer appears in `manifest`.
    pub fn orphans<'a>(
        &'a self,
        manifest: &'a Manifest,
    ) -> impl Iterator<Item = (&'a str, &'a LockRecord)> + 'a {
        self.records
            .iter()
            .filter(|(key, _)| !manifest.contains_key(key))
            .map(|(key, record)| (key.as_str(), record))
    }

    async fn persist(&self) -> Result<()> {
        let bytes = encode(&self.records)?;
        let path = self.path.clone();
        spawn_blocking(move || write_atomically(&path, &bytes)).await?
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, LockRecord>> {
    let contents: Contents =
        serde_json::from_slice(bytes).map_err(|err| Error::corrupt(path, err))?;
    if contents.version != FORMAT_VERSION {
        return Err(Error::corrupt(
            path,
            format!("unsupported version {}", contents.version),
        ));
    }

    Ok(contents.records)
}

fn encode(records: &BTreeMap<String, LockRecord>) -> Result<Vec<u8>> {
    let contents = Contents {
        version: FORMAT_VERSION,
        records: records.clone(),
    };
    let mut bytes = serde_json::to_vec_pretty(&contents)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    sync_dir(dir)
}

/// Makes a rename inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

use std::{
    ffi::OsString,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use log::debug;
use tokio::{fs, time::sleep};

use crate::{
    error::{Error, Result},
    format::{format_key, format_path},
    manifest::StorageClass,
};

use super::Storage;

const PARTIAL_SUFFIX: &str = ".partial";

/// Stores objects as plain files under a root directory. The storage class
/// has no meaning here and is only logged.
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    latency: Option<Duration>,
}

impl LocalStorage {
    pub fn new(path: PathBuf, latency: Option<Duration>) -> Self {
        LocalStorage { path, latency }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if relative.as_os_str().is_empty() || !is_plain {
            return Err(Error::Transfer {
                key: key.to_owned(),
                reason: "key cannot be mapped to a local path".to_owned(),
            });
        }

        Ok(self.path.join(relative))
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        storage_class: StorageClass,
    ) -> Result<u64> {
        self.simulate_latency().await;

        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial_path = OsString::from(path.as_os_str());
        partial_path.push(PARTIAL_SUFFIX);
        let partial_path = PathBuf::from(partial_path);

        let size = fs::copy(local_path, &partial_path).await?;
        fs::File::open(&partial_path).await?.sync_all().await?;
        fs::rename(&partial_path, &path).await?;

        debug!(
            "stored {} at {} ({storage_class})",
            format_key(key),
            format_path(&path)
        );
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::{
        error::Error,
        manifest::StorageClass,
        storage::{LocalStorage, Storage},
    };

    #[tokio::test]
    async fn upload_copies_into_nested_key() {
        let source = TempDir::new().unwrap();
        let bucket = TempDir::new().unwrap();
        let file = source.path().join("a.txt");
        fs::write(&file, "alpha").unwrap();

        let storage = LocalStorage::new(bucket.path().to_owned(), None);
        let size = storage
            .upload(&file, "root/a.txt", StorageClass::Standard)
            .await
            .unwrap();

        assert_eq!(size, 5);
        assert_eq!(fs::read(bucket.path().join("root/a.txt")).unwrap(), b"alpha");
        assert!(!bucket.path().join("root/a.txt.partial").exists());
    }

    #[tokio::test]
    async fn upload_rejects_escaping_keys() {
        let source = TempDir::new().unwrap();
        let bucket = TempDir::new().unwrap();
        let file = source.path().join("a.txt");
        fs::write(&file, "alpha").unwrap();

        let storage = LocalStorage::new(bucket.path().to_owned(), None);
        let err = storage
            .upload(&file, "../escape.txt", StorageClass::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }

    #[tokio::test]
    async fn upload_missing_source_error() {
        let bucket = TempDir::new().unwrap();
        let storage = LocalStorage::new(bucket.path().to_owned(), None);
        let result = storage
            .upload(&bucket.path().join("nope"), "nope", StorageClass::Standard)
            .await;
        assert!(result.is_err());
        assert!(!bucket.path().join("nope").exists());
    }
}

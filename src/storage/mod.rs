mod local;
mod s3;

use std::{fmt::Debug, path::Path};

use async_trait::async_trait;

use crate::{error::Result, manifest::StorageClass};

pub use {local::LocalStorage, s3::S3Storage};

pub type BoxedStorage = Box<dyn Storage + Sync + Send + 'static>;

/// Moves one local file into the backend under `key`.
///
/// Implementations own retries and credentials. An object must not become
/// visible under `key` unless the whole file was written.
#[async_trait]
pub trait Storage: Debug {
    /// Returns the number of bytes sent.
    async fn upload(&self, local_path: &Path, key: &str, storage_class: StorageClass)
        -> Result<u64>;
}

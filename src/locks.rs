use std::{collections::HashMap, sync::Arc};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;

/// One single-permit semaphore per target key, so entries sharing a key
/// never run at the same time.
#[derive(Debug, Default)]
pub struct KeyLocks {
    semaphores: HashMap<String, Arc<Semaphore>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        KeyLocks {
            semaphores: HashMap::new(),
        }
    }

    pub fn semaphore(&mut self, key: &str) -> Arc<Semaphore> {
        self.semaphores
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Waits until no other holder of `key` is running.
    pub async fn lock(&mut self, key: &str) -> Result<OwnedSemaphorePermit> {
        let permit = self.semaphore(key).acquire_owned().await?;
        Ok(permit)
    }
}

//! Key-value persistence behind the credential and library stores.

mod credentials;
mod file;
mod library;
mod redis;

pub use credentials::CredentialStore;
pub use file::FileStore;
pub use library::{LibraryInput, LibraryItem, LibraryStore};
pub use self::redis::RedisStore;

use crate::config::StorageConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// String values under string keys. Each namespace is one key.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Redis when `REDIS_URL` is set, otherwise a JSON file in the data dir.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    if let Some(url) = config.redis_url.as_deref() {
        info!(target = "vibe.store", backend = "redis", "storage ready");
        return Ok(Arc::new(RedisStore::open(url)?));
    }
    let store = FileStore::new(config.data_dir.join("store.json"));
    info!(
        target = "vibe.store",
        backend = "file",
        path = %store.path().display(),
        "storage ready"
    );
    Ok(Arc::new(store))
}

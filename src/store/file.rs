use super::{KvStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// All keys in one JSON object file. Writes land in a sibling temp file first
/// and are renamed over the original.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_object(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                warn!(
                    target = "vibe.store",
                    path = %self.path.display(),
                    "store file is not a JSON object; starting empty"
                );
                Ok(Map::new())
            }
        }
    }

    async fn write_object(&self, payload: Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&Value::Object(payload))?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let object = self.read_object().await?;
        Ok(object.get(key).and_then(Value::as_str).map(str::to_string))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut object = self.read_object().await?;
        object.insert(key.to_string(), Value::String(value));
        self.write_object(object).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut object = self.read_object().await?;
        if object.remove(key).is_some() {
            self.write_object(object).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("vibe-store-{}", uuid::Uuid::new_v4()))
            .join("store.json")
    }

    #[tokio::test]
    async fn values_survive_a_new_handle() {
        let path = temp_path();
        let store = FileStore::new(&path);
        store.set("easy_vibe_api_keys", "{\"llmKey\":\"sk\"}".into()).await.unwrap();
        store.set("other", "x".into()).await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("easy_vibe_api_keys").await.unwrap().as_deref(),
            Some("{\"llmKey\":\"sk\"}")
        );
        reopened.delete("other").await.unwrap();
        assert_eq!(store.get("other").await.unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn missing_or_garbage_file_reads_empty() {
        let path = temp_path();
        let store = FileStore::new(&path);
        assert_eq!(store.get("k").await.unwrap(), None);

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

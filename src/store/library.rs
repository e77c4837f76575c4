use super::{KvStore, StoreError};
use crate::config::LIBRARY_NAMESPACE;
use crate::models::{GenerationResult, ProductInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// The product form as saved: the binary upload is dropped, its preview kept.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInput {
    pub name: String,
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub selling_points: Option<String>,
    #[serde(default)]
    pub image_preview: Option<String>,
    #[serde(default)]
    pub original_image: Option<String>,
}

impl From<&ProductInput> for LibraryInput {
    fn from(input: &ProductInput) -> Self {
        let preview = input.image_source();
        Self {
            name: input.name.clone(),
            brand: input.brand.clone(),
            category: input.category.clone(),
            target_audience: input.target_audience.clone(),
            selling_points: input.selling_points.clone(),
            image_preview: preview.clone(),
            original_image: preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub input: LibraryInput,
    pub result: GenerationResult,
}

impl LibraryItem {
    /// Form values for generating again from this item. The first generated
    /// image becomes the preview.
    pub fn reuse_input(&self) -> ProductInput {
        let preview = self
            .result
            .images
            .first()
            .map(|image| image.url.clone())
            .or_else(|| self.input.image_preview.clone());
        ProductInput {
            name: self.input.name.clone(),
            brand: self.input.brand.clone(),
            category: self.input.category.clone(),
            target_audience: self.input.target_audience.clone(),
            selling_points: self.input.selling_points.clone(),
            image: None,
            image_preview: preview,
        }
    }
}

/// Saved generations, newest first.
#[derive(Clone)]
pub struct LibraryStore {
    kv: Arc<dyn KvStore>,
    write: Arc<Mutex<()>>,
}

impl LibraryStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write: Arc::new(Mutex::new(())),
        }
    }

    pub async fn list(&self) -> Result<Vec<LibraryItem>, StoreError> {
        let Some(raw) = self.kv.get(LIBRARY_NAMESPACE).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(err) => {
                warn!(target = "vibe.store", error = %err, "library record is corrupt; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<LibraryItem>, StoreError> {
        Ok(self.list().await?.into_iter().find(|item| item.id == id))
    }

    pub async fn save(
        &self,
        input: &ProductInput,
        result: &GenerationResult,
    ) -> Result<LibraryItem, StoreError> {
        let item = LibraryItem {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            input: LibraryInput::from(input),
            result: result.clone(),
        };

        let _guard = self.write.lock().await;
        let mut items = self.list().await?;
        items.insert(0, item.clone());
        self.persist(&items).await?;
        info!(
            target = "vibe.store",
            id = %item.id,
            total = items.len(),
            "library item saved"
        );
        Ok(item)
    }

    /// Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write.lock().await;
        let mut items = self.list().await?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.persist(&items).await?;
        info!(target = "vibe.store", id = id, "library item deleted");
        Ok(true)
    }

    async fn persist(&self, items: &[LibraryItem]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(items)?;
        self.kv.set(LIBRARY_NAMESPACE, raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CopywritingVersion, GeneratedImage, ImageUpload};
    use crate::store::MemoryStore;

    fn store() -> (LibraryStore, Arc<dyn KvStore>) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
        (LibraryStore::new(kv.clone()), kv)
    }

    fn result(url: &str) -> GenerationResult {
        GenerationResult {
            copywritings: vec![CopywritingVersion {
                id: "cw-1".into(),
                title: "标题".into(),
                content: "标题\n正文".into(),
            }],
            images: vec![GeneratedImage {
                id: "img-1".into(),
                url: url.into(),
                description: "商品场景展示图 1".into(),
            }],
        }
    }

    fn input(name: &str) -> ProductInput {
        ProductInput {
            name: name.into(),
            brand: "品牌".into(),
            image: Some(ImageUpload {
                mime_type: "image/png".into(),
                data: "iVBORw0KGgo=".into(),
            }),
            ..ProductInput::default()
        }
    }

    #[tokio::test]
    async fn save_prepends_and_drops_binary_upload() {
        let (library, kv) = store();
        let first = library.save(&input("一"), &result("https://a")).await.unwrap();
        let second = library.save(&input("二"), &result("https://b")).await.unwrap();

        let items = library.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, second.id);
        assert_eq!(items[1].id, first.id);
        assert_eq!(
            items[0].input.image_preview.as_deref(),
            Some("data:image/png;base64,iVBORw0KGgo=")
        );
        assert_eq!(items[0].input.original_image, items[0].input.image_preview);

        let raw = kv.get(LIBRARY_NAMESPACE).await.unwrap().unwrap();
        assert!(!raw.contains("\"image\":"));
        assert!(raw.contains("imagePreview"));
    }

    #[tokio::test]
    async fn get_and_delete() {
        let (library, _) = store();
        let item = library.save(&input("一"), &result("https://a")).await.unwrap();
        assert_eq!(library.get(&item.id).await.unwrap(), Some(item.clone()));

        assert!(library.delete(&item.id).await.unwrap());
        assert!(!library.delete(&item.id).await.unwrap());
        assert!(library.get(&item.id).await.unwrap().is_none());
        assert!(library.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_library_reads_empty() {
        let (library, kv) = store();
        kv.set(LIBRARY_NAMESPACE, "[{\"broken\":".into()).await.unwrap();
        assert!(library.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reuse_prefers_first_generated_image() {
        let (library, _) = store();
        let item = library
            .save(&input("保温杯"), &result("https://cdn.example.com/scene.jpeg"))
            .await
            .unwrap();
        let reused = item.reuse_input();
        assert_eq!(reused.name, "保温杯");
        assert_eq!(reused.brand, "品牌");
        assert!(reused.image.is_none());
        assert_eq!(
            reused.image_preview.as_deref(),
            Some("https://cdn.example.com/scene.jpeg")
        );
    }

    #[tokio::test]
    async fn concurrent_saves_keep_every_item() {
        let (library, _) = store();
        let saves = (0..8).map(|n| {
            let library = library.clone();
            async move {
                library
                    .save(&input(&format!("p{n}")), &result("https://x"))
                    .await
                    .unwrap()
            }
        });
        futures::future::join_all(saves).await;
        assert_eq!(library.list().await.unwrap().len(), 8);
    }
}

use super::{KvStore, StoreError};
use crate::config::CREDENTIALS_NAMESPACE;
use crate::models::Credentials;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// A missing or unreadable record yields empty credentials.
    pub async fn load(&self) -> Result<Credentials, StoreError> {
        let Some(raw) = self.kv.get(CREDENTIALS_NAMESPACE).await? else {
            return Ok(Credentials::default());
        };
        match serde_json::from_str(&raw) {
            Ok(credentials) => Ok(credentials),
            Err(err) => {
                warn!(target = "vibe.store", error = %err, "stored credentials are corrupt; ignoring");
                Ok(Credentials::default())
            }
        }
    }

    pub async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let raw = serde_json::to_string(credentials)?;
        self.kv.set(CREDENTIALS_NAMESPACE, raw).await?;
        info!(target = "vibe.store", status = ?credentials.status(), "credentials saved");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.kv.delete(CREDENTIALS_NAMESPACE).await?;
        info!(target = "vibe.store", "credentials cleared");
        Ok(())
    }
}

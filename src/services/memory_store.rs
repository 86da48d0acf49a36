//! In-process blob store. Contents are lost when the process exits.

use super::blob_store::{BlobError, BlobResult, BlobStore, ensure_key_safe};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<()> {
        ensure_key_safe(key)?;
        self.blobs.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        ensure_key_safe(key)?;
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        ensure_key_safe(key)?;
        self.blobs
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        ensure_key_safe(key)?;
        Ok(self.blobs.read().await.contains_key(key))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

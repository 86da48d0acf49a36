//! Read-only access to published objects and in-flight chunks.

use super::blob_store::{BlobResult, BlobStore};
use crate::models::chunk::{ChunkIndex, UploadId, parse_chunk_key};
use bytes::Bytes;
use serde::Serialize;
use std::{collections::BTreeSet, sync::Arc};

/// Which chunks of an upload are currently stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkStatus {
    pub upload_id: UploadId,
    pub received: Vec<ChunkIndex>,
    pub missing: Vec<ChunkIndex>,
    pub assembled: bool,
}

#[derive(Clone)]
pub struct ObjectAccess {
    store: Arc<dyn BlobStore>,
}

impl ObjectAccess {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub async fn get_object(&self, key: &str) -> BlobResult<Bytes> {
        self.store.get(key).await
    }

    /// Names stored beneath `folder`, with the `folder/` prefix stripped.
    pub async fn list_objects(&self, folder: &str) -> BlobResult<Vec<String>> {
        let folder = folder.trim_matches('/');
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{}/", folder)
        };
        let keys = self.store.list(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Report received and missing chunks against an expected count.
    ///
    /// Purely informational; assembly always goes by the caller's manifest.
    pub async fn chunk_status(&self, upload_id: &UploadId, total: u32) -> BlobResult<ChunkStatus> {
        let received: BTreeSet<ChunkIndex> = self
            .store
            .list(&upload_id.chunk_prefix())
            .await?
            .iter()
            .filter_map(|key| parse_chunk_key(upload_id, key))
            .collect();

        let missing = (1..=total)
            .filter_map(|n| ChunkIndex::new(n).ok())
            .filter(|index| !received.contains(index))
            .collect();

        Ok(ChunkStatus {
            upload_id: upload_id.clone(),
            received: received.into_iter().collect(),
            missing,
            assembled: self.store.exists(&upload_id.object_key()).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryBlobStore;

    async fn seeded(keys: &[&str]) -> ObjectAccess {
        let store = Arc::new(MemoryBlobStore::new());
        for key in keys {
            store.put(key, Bytes::from_static(b"x")).await.unwrap();
        }
        ObjectAccess::new(store)
    }

    #[tokio::test]
    async fn lists_names_relative_to_folder() {
        let access = seeded(&["docs/a.pdf", "docs/b.pdf/chunk_1", "docsx/c", "other/d"]).await;
        assert_eq!(
            access.list_objects("docs").await.unwrap(),
            vec!["a.pdf", "b.pdf/chunk_1"]
        );
        assert_eq!(access.list_objects("docs/").await.unwrap().len(), 2);
        assert!(access.list_objects("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_object_passes_through_not_found() {
        let access = seeded(&["a/b"]).await;
        assert_eq!(access.get_object("a/b").await.unwrap(), Bytes::from_static(b"x"));
        assert!(access.get_object("a/c").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn status_orders_chunks_numerically() {
        let access = seeded(&["u/chunk_10", "u/chunk_2", "u/chunk_1", "u/notes"]).await;
        let id = UploadId::new("u").unwrap();

        let status = access.chunk_status(&id, 11).await.unwrap();
        let received: Vec<u32> = status.received.iter().map(|i| i.get()).collect();
        let missing: Vec<u32> = status.missing.iter().map(|i| i.get()).collect();
        assert_eq!(received, vec![1, 2, 10]);
        assert_eq!(missing, vec![3, 4, 5, 6, 7, 8, 9, 11]);
        assert!(!status.assembled);
    }
}

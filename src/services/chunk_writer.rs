//! Chunk writes: one keyed put per chunk, no coordination.
//!
//! A retry with the same index overwrites the earlier payload, so sending a
//! chunk twice leaves the store exactly as sending it once.

use super::blob_store::BlobStore;
use crate::models::chunk::{ChunkIndex, UploadId, chunk_key};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChunkWriteError {
    #[error("failed to store chunk {chunk_number} of `{upload_id}` at `{chunk_key}`: {reason}")]
    StorageWriteFailed {
        upload_id: String,
        chunk_number: ChunkIndex,
        chunk_key: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkAck {
    pub upload_id: UploadId,
    pub chunk_key: String,
    pub chunk_number: ChunkIndex,
    pub size_bytes: usize,
}

#[derive(Clone)]
pub struct ChunkWriter {
    store: Arc<dyn BlobStore>,
}

impl ChunkWriter {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Persist one chunk under its derived key. Empty payloads are allowed.
    pub async fn write_chunk(
        &self,
        upload_id: &UploadId,
        index: ChunkIndex,
        payload: Bytes,
    ) -> Result<ChunkAck, ChunkWriteError> {
        let key = chunk_key(upload_id, index);
        let size_bytes = payload.len();

        self.store
            .put(&key, payload)
            .await
            .map_err(|err| ChunkWriteError::StorageWriteFailed {
                upload_id: upload_id.to_string(),
                chunk_number: index,
                chunk_key: key.clone(),
                reason: err.to_string(),
            })?;

        debug!(upload_id = %upload_id, chunk = %index, size_bytes, "stored chunk");
        Ok(ChunkAck {
            upload_id: upload_id.clone(),
            chunk_key: key,
            chunk_number: index,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        blob_store::{BlobError, BlobResult},
        memory_store::MemoryBlobStore,
    };
    use async_trait::async_trait;
    use std::io;

    fn idx(n: u32) -> ChunkIndex {
        ChunkIndex::new(n).unwrap()
    }

    #[tokio::test]
    async fn writes_under_derived_key() {
        let store = Arc::new(MemoryBlobStore::new());
        let writer = ChunkWriter::new(store.clone());
        let id = UploadId::new("docs/report.pdf").unwrap();

        let ack = writer
            .write_chunk(&id, idx(2), Bytes::from_static(b"page two"))
            .await
            .unwrap();

        assert_eq!(ack.chunk_key, "docs/report.pdf/chunk_2");
        assert_eq!(ack.size_bytes, 8);
        assert_eq!(
            store.get("docs/report.pdf/chunk_2").await.unwrap(),
            Bytes::from_static(b"page two")
        );
    }

    #[tokio::test]
    async fn repeated_write_is_idempotent() {
        let store = Arc::new(MemoryBlobStore::new());
        let writer = ChunkWriter::new(store.clone());
        let id = UploadId::new("u").unwrap();

        writer.write_chunk(&id, idx(1), Bytes::from_static(b"abc")).await.unwrap();
        let once = store.list("").await.unwrap();
        writer.write_chunk(&id, idx(1), Bytes::from_static(b"abc")).await.unwrap();

        assert_eq!(store.list("").await.unwrap(), once);
        assert_eq!(store.get("u/chunk_1").await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn retry_overwrites_previous_payload() {
        let store = Arc::new(MemoryBlobStore::new());
        let writer = ChunkWriter::new(store.clone());
        let id = UploadId::new("u").unwrap();

        writer.write_chunk(&id, idx(1), Bytes::from_static(b"partial")).await.unwrap();
        writer.write_chunk(&id, idx(1), Bytes::from_static(b"full")).await.unwrap();
        assert_eq!(store.get("u/chunk_1").await.unwrap(), Bytes::from_static(b"full"));
    }

    /// Refuses every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl BlobStore for ReadOnlyStore {
        async fn put(&self, _key: &str, _data: Bytes) -> BlobResult<()> {
            Err(BlobError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only file system",
            )))
        }
        async fn get(&self, key: &str) -> BlobResult<Bytes> {
            Err(BlobError::NotFound(key.to_string()))
        }
        async fn delete(&self, key: &str) -> BlobResult<()> {
            Err(BlobError::NotFound(key.to_string()))
        }
        async fn list(&self, _prefix: &str) -> BlobResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn backend_name(&self) -> &'static str {
            "read-only"
        }
    }

    #[tokio::test]
    async fn storage_failure_names_the_chunk() {
        let writer = ChunkWriter::new(Arc::new(ReadOnlyStore));
        let id = UploadId::new("docs/report.pdf").unwrap();
        let err = writer
            .write_chunk(&id, idx(4), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        let ChunkWriteError::StorageWriteFailed {
            chunk_number,
            chunk_key,
            reason,
            ..
        } = err;
        assert_eq!(chunk_number, idx(4));
        assert_eq!(chunk_key, "docs/report.pdf/chunk_4");
        assert!(reason.contains("read-only"), "{reason}");
    }
}

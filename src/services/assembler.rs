//! Assembly coordinator.
//!
//! Turns a complete set of chunks into one published object:
//!
//! 1. resolve the manifest into chunk keys in ascending numeric order,
//! 2. take the upload's lease (one assembler per upload),
//! 3. stop if the object already exists: it is never rebuilt,
//! 4. fetch every chunk, in parallel but collected in order,
//! 5. abort without publishing if any chunk is missing or unreadable,
//! 6. publish the concatenation with a single `put`, if the lease still holds,
//! 7. delete the consumed chunks; failures here are reported, not fatal.
//!
//! Re-running a finished assembly returns `AlreadyAssembled` and sweeps any
//! chunk keys still stored for the upload.

use super::{
    blob_store::{BlobError, BlobStore},
    lease::{AssemblyLeases, Lease, LeaseError},
};
use crate::models::{
    assembly::{AssemblyOutcome, GroupFailure, GroupReport, GroupResult},
    chunk::{ChunkIndex, NameError, UploadId, chunk_key, parse_chunk_key},
    manifest::{Manifest, ManifestError, group_part_names},
};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Logical files of one batch assembled at the same time. Each one holds its
/// whole payload in memory while it is built.
const BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    InvalidManifest(#[from] ManifestError),
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("{declared} chunks declared but {listed} chunk names listed")]
    CountMismatch { declared: u32, listed: usize },
    #[error("upload `{upload_id}` is missing chunk(s) {}", join(.indices))]
    ChunksMissing {
        upload_id: String,
        indices: Vec<ChunkIndex>,
    },
    #[error("failed to read `{key}`: {reason}")]
    StorageReadFailed { key: String, reason: String },
    #[error("failed to publish `{key}`: {reason}")]
    StorageWriteFailed { key: String, reason: String },
    #[error("assembly of `{0}` is already in progress")]
    InProgress(String),
    #[error("assembly lease for `{0}` expired before the object was published")]
    LeaseExpired(String),
    #[error("lease storage failed: {0}")]
    Lease(sqlx::Error),
}

impl From<LeaseError> for AssemblyError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::InProgress(upload_id) => AssemblyError::InProgress(upload_id),
            LeaseError::Sqlx(err) => AssemblyError::Lease(err),
        }
    }
}

impl AssemblyError {
    /// Short machine-readable identifier, shared with HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AssemblyError::InvalidManifest(_)
            | AssemblyError::InvalidName(_)
            | AssemblyError::CountMismatch { .. } => "bad_request",
            AssemblyError::ChunksMissing { .. } => "chunk_missing",
            AssemblyError::StorageReadFailed { .. } => "storage_read_failed",
            AssemblyError::StorageWriteFailed { .. } => "storage_write_failed",
            AssemblyError::InProgress(_) => "assembly_in_progress",
            AssemblyError::LeaseExpired(_) => "lease_expired",
            AssemblyError::Lease(_) => "internal",
        }
    }
}

#[derive(Clone)]
pub struct Assembler {
    store: Arc<dyn BlobStore>,
    leases: AssemblyLeases,
    fetch_concurrency: usize,
}

/// Result of fetching one expected chunk.
struct Fetched {
    index: ChunkIndex,
    key: String,
    result: Result<Bytes, BlobError>,
}

impl Assembler {
    pub fn new(store: Arc<dyn BlobStore>, leases: AssemblyLeases, fetch_concurrency: usize) -> Self {
        Self {
            store,
            leases,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Assemble one upload from the chunks its manifest names.
    pub async fn assemble(
        &self,
        upload_id: &UploadId,
        manifest: &Manifest,
    ) -> Result<AssemblyOutcome, AssemblyError> {
        let indices = manifest.resolve()?;
        let lease = self.leases.acquire(upload_id).await?;
        let result = self.assemble_locked(&lease, upload_id, &indices).await;
        lease.release().await;

        match &result {
            Ok(AssemblyOutcome::Assembled {
                chunk_count,
                size_bytes,
                cleanup_failures,
                ..
            }) => info!(
                upload_id = %upload_id,
                chunk_count,
                size_bytes,
                cleanup_failures = cleanup_failures.len(),
                "assembled upload"
            ),
            Ok(AssemblyOutcome::AlreadyAssembled { .. }) => {
                info!(upload_id = %upload_id, "upload already assembled")
            }
            Err(err) => warn!(upload_id = %upload_id, error = %err, "assembly failed"),
        }
        result
    }

    /// Assemble every logical file named in a batch of `<file>._part_<n>`
    /// names stored under `folder`.
    ///
    /// Names are validated up front; after that each file succeeds or fails
    /// on its own.
    pub async fn assemble_batch<S: AsRef<str>>(
        &self,
        folder: &str,
        names: &[S],
        declared_total: Option<u32>,
    ) -> Result<Vec<GroupReport>, AssemblyError> {
        if let Some(declared) = declared_total {
            if usize::try_from(declared).ok() != Some(names.len()) {
                return Err(AssemblyError::CountMismatch {
                    declared,
                    listed: names.len(),
                });
            }
        }

        let groups = group_part_names(names)?;
        let mut targets = Vec::with_capacity(groups.len());
        for (file, manifest) in groups {
            let upload_id = UploadId::scoped(folder, &file)?;
            targets.push((file, upload_id, manifest));
        }

        let reports: Vec<GroupReport> = stream::iter(targets)
            .map(|(file, upload_id, manifest)| async move {
                let result = match self.assemble(&upload_id, &manifest).await {
                    Ok(outcome) => GroupResult::Ok(outcome),
                    Err(err) => GroupResult::Failed(GroupFailure {
                        status: "failed",
                        code: err.code(),
                        missing: match &err {
                            AssemblyError::ChunksMissing { indices, .. } => indices.clone(),
                            _ => Vec::new(),
                        },
                        error: err.to_string(),
                    }),
                };
                GroupReport { file, result }
            })
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await;

        Ok(reports)
    }

    async fn assemble_locked(
        &self,
        lease: &Lease,
        upload_id: &UploadId,
        indices: &[ChunkIndex],
    ) -> Result<AssemblyOutcome, AssemblyError> {
        let object_key = upload_id.object_key();
        let published = self
            .store
            .exists(&object_key)
            .await
            .map_err(|err| AssemblyError::StorageReadFailed {
                key: object_key.clone(),
                reason: err.to_string(),
            })?;
        if published {
            self.sweep_chunks(upload_id).await;
            return Ok(AssemblyOutcome::AlreadyAssembled { object_key });
        }

        let fetched = self.fetch_all(upload_id, indices).await;

        let mut missing = Vec::new();
        let mut present = Vec::with_capacity(fetched.len());
        let mut parts = Vec::with_capacity(fetched.len());
        for chunk in fetched {
            match chunk.result {
                Ok(bytes) => {
                    present.push(chunk.key);
                    parts.push(bytes);
                }
                Err(err) if err.is_not_found() => missing.push(chunk.index),
                Err(err) => {
                    return Err(AssemblyError::StorageReadFailed {
                        key: chunk.key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if !missing.is_empty() {
            return Err(AssemblyError::ChunksMissing {
                upload_id: upload_id.to_string(),
                indices: missing,
            });
        }

        let size: usize = parts.iter().map(Bytes::len).sum();
        let mut combined = BytesMut::with_capacity(size);
        for part in &parts {
            combined.extend_from_slice(part);
        }
        drop(parts);

        // another caller may own the upload once the lease has expired
        if !lease.is_held().await? {
            return Err(AssemblyError::LeaseExpired(upload_id.to_string()));
        }
        self.store
            .put(&object_key, combined.freeze())
            .await
            .map_err(|err| AssemblyError::StorageWriteFailed {
                key: object_key.clone(),
                reason: err.to_string(),
            })?;

        let chunk_count = present.len();
        let cleanup_failures = self.delete_chunks(upload_id, present).await;

        Ok(AssemblyOutcome::Assembled {
            object_key,
            chunk_count,
            size_bytes: size as u64,
            cleanup_failures,
        })
    }

    /// Fetch all expected chunks. Output order matches `indices` regardless
    /// of which fetch finishes first.
    async fn fetch_all(&self, upload_id: &UploadId, indices: &[ChunkIndex]) -> Vec<Fetched> {
        stream::iter(indices.iter().copied())
            .map(|index| {
                let key = chunk_key(upload_id, index);
                let store = self.store.clone();
                async move {
                    let result = store.get(&key).await;
                    Fetched { index, key, result }
                }
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await
    }

    /// Remove every chunk still stored for an upload whose object exists.
    async fn sweep_chunks(&self, upload_id: &UploadId) {
        let keys = match self.store.list(&upload_id.chunk_prefix()).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(upload_id = %upload_id, error = %err, "failed to list leftover chunks");
                return;
            }
        };
        let leftovers: Vec<String> = keys
            .into_iter()
            .filter(|key| parse_chunk_key(upload_id, key).is_some())
            .collect();
        if !leftovers.is_empty() {
            info!(upload_id = %upload_id, count = leftovers.len(), "removing chunks of an assembled upload");
            self.delete_chunks(upload_id, leftovers).await;
        }
    }

    /// Delete consumed chunk keys, returning the ones that could not be
    /// removed. A key that is already gone counts as removed.
    async fn delete_chunks(&self, upload_id: &UploadId, keys: Vec<String>) -> Vec<String> {
        let store = &self.store;
        let failures: Vec<Option<String>> = stream::iter(keys)
            .map(|key| async move {
                match store.delete(&key).await {
                    Ok(()) => None,
                    Err(err) if err.is_not_found() => None,
                    Err(err) => {
                        warn!(upload_id = %upload_id, key = %key, error = %err, "failed to delete chunk after assembly");
                        Some(key)
                    }
                }
            })
            .buffer_unordered(self.fetch_concurrency)
            .collect()
            .await;

        let mut failures: Vec<String> = failures.into_iter().flatten().collect();
        failures.sort();
        failures
    }
}

fn join(indices: &[ChunkIndex]) -> String {
    indices
        .iter()
        .map(ChunkIndex::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

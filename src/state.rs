//! Shared handler state. Every component is constructed once in `main` and
//! cloned cheaply into each request.

use crate::services::{
    assembler::Assembler, auth::Authorizer, blob_store::BlobStore, chunk_writer::ChunkWriter,
    lease::AssemblyLeases, object_access::ObjectAccess,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite pool used for assembly leases and readiness checks.
    pub db: Arc<SqlitePool>,
    pub store: Arc<dyn BlobStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub writer: ChunkWriter,
    pub assembler: Assembler,
    pub objects: ObjectAccess,
}

impl AppState {
    /// Wire every service to the same blob store and database.
    pub fn new(
        db: Arc<SqlitePool>,
        store: Arc<dyn BlobStore>,
        authorizer: Arc<dyn Authorizer>,
        leases: AssemblyLeases,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            writer: ChunkWriter::new(store.clone()),
            assembler: Assembler::new(store.clone(), leases, fetch_concurrency),
            objects: ObjectAccess::new(store.clone()),
            db,
            store,
            authorizer,
        }
    }
}

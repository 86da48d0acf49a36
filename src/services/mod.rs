//! Services behind the HTTP handlers.
//!
//! Blob storage is reached only through the `BlobStore` trait; the concrete
//! backend is chosen in `main` and handed to each service.

pub mod assembler;
pub mod auth;
pub mod blob_store;
pub mod chunk_writer;
pub mod disk_store;
pub mod lease;
pub mod memory_store;
pub mod object_access;

//! Blob store abstraction shared by every service.
//!
//! Keys are `/`-separated strings. The store guarantees last-writer-wins per
//! key and nothing across keys.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

const MAX_KEY_LEN: usize = 1024;

/// Longest percent-encoded key a backend must accept. The disk backend stores
/// each key as a single file name, and most filesystems stop at 255 bytes.
pub const MAX_ENCODED_KEY_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound(_))
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store `data` under `key`, replacing any previous value in one step.
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<()>;

    /// Fetch the full value at `key`.
    async fn get(&self, key: &str) -> BlobResult<Bytes>;

    /// Remove `key`. Returns `NotFound` if nothing was stored there.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// All keys starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>>;

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Short backend identifier used in logs and readiness output.
    fn backend_name(&self) -> &'static str;
}

/// Validate a key before it reaches a backend.
///
/// Rejects empty or oversized keys, a leading `/`, `.` and `..` segments,
/// empty segments, control characters and backslashes.
pub fn ensure_key_safe(key: &str) -> BlobResult<()> {
    let invalid = || BlobError::InvalidKey(key.to_string());
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.starts_with('/') {
        return Err(invalid());
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(invalid());
    }
    Ok(())
}

/// `ensure_key_safe`, plus the length limit every backend can store.
pub fn ensure_key_portable(key: &str) -> BlobResult<()> {
    ensure_key_safe(key)?;
    if urlencoding::encode(key).len() > MAX_ENCODED_KEY_LEN {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_keys() {
        assert!(ensure_key_safe("folder/file.bin/chunk_1").is_ok());
        assert!(ensure_key_safe(".readyz/probe").is_ok());
    }

    #[test]
    fn rejects_traversal_and_garbage() {
        for key in [
            "",
            "/abs",
            "a/../b",
            "a/./b",
            "..",
            "a//b",
            "trailing/",
            "tab\there",
            "back\\slash",
        ] {
            assert!(
                matches!(ensure_key_safe(key), Err(BlobError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
        let long = "k".repeat(MAX_KEY_LEN + 1);
        assert!(ensure_key_safe(&long).is_err());
    }

    #[test]
    fn portable_keys_fit_one_file_name() {
        assert!(ensure_key_portable("docs/a.bin/chunk_1").is_ok());
        // each `/` encodes to three bytes
        let slashes = vec!["k"; 100].join("/");
        assert!(ensure_key_safe(&slashes).is_ok());
        assert!(ensure_key_portable(&slashes).is_err());
        assert!(ensure_key_portable(&"k".repeat(MAX_ENCODED_KEY_LEN)).is_ok());
        assert!(ensure_key_portable(&"k".repeat(MAX_ENCODED_KEY_LEN + 1)).is_err());
    }
}

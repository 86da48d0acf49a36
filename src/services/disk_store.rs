//! src/services/disk_store.rs
//!
//! DiskBlobStore: blob payloads on local disk, sharded beneath
//! `base_path/{shard}/{shard}/{encoded key}`. Keys are percent-encoded into a
//! single file name, so `U` and `U/chunk_1` never collide as file and
//! directory.

use super::blob_store::{BlobError, BlobResult, BlobStore, ensure_key_portable};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Directory beneath `base_path` holding in-progress writes.
const STAGING_DIR: &str = ".staging";

#[derive(Clone, Debug)]
pub struct DiskBlobStore {
    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,
}

impl DiskBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Generate two-level shard identifiers for a key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct the payload path for a validated key.
    fn object_path(&self, key: &str) -> BlobResult<PathBuf> {
        ensure_key_portable(key)?;
        let encoded = urlencoding::encode(key);
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(encoded.as_ref());
        Ok(path)
    }

    /// Write `data` to a fresh staging file and fsync it.
    async fn stage(&self, data: &[u8]) -> BlobResult<PathBuf> {
        let staging = self.base_path.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let written = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        Ok(tmp_path)
    }

    /// Move a staged file into place.
    ///
    /// The parent may vanish between creation and rename when a concurrent
    /// delete prunes it, so a missing parent is recreated once.
    async fn publish(&self, tmp_path: &Path, file_path: &Path) -> io::Result<()> {
        let parent = file_path
            .parent()
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "blob path missing parent directory"))?;

        for attempt in 0..2 {
            fs::create_dir_all(parent).await?;
            match fs::rename(tmp_path, file_path).await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    fs::remove_file(file_path).await?;
                    return fs::rename(tmp_path, file_path).await;
                }
                Err(err) if err.kind() == ErrorKind::NotFound && attempt == 0 => {
                    debug!("parent {} vanished before rename, retrying", parent.display());
                }
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::new(
            ErrorKind::NotFound,
            "blob directory removed during publish",
        ))
    }

    /// Recursively remove empty directories up to the base path.
    ///
    /// Stops when the directory is not empty, is missing, is the base path,
    /// or on unexpected I/O errors.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn shard_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(dirs),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let is_shard = entry.file_name().to_str().is_some_and(is_shard_name);
            if is_shard && entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<()> {
        let file_path = self.object_path(key)?;
        let tmp_path = self.stage(&data).await?;
        if let Err(err) = self.publish(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        debug!(key, size = data.len(), "stored blob at {}", file_path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        let file_path = self.object_path(key)?;
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let file_path = self.object_path(key)?;
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BlobError::NotFound(key.to_string()));
            }
            Err(err) => return Err(BlobError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>> {
        let mut keys = BTreeSet::new();
        for outer in Self::shard_dirs(&self.base_path).await? {
            for inner in Self::shard_dirs(&outer).await? {
                let mut entries = match fs::read_dir(&inner).await {
                    Ok(entries) => entries,
                    // pruned by a concurrent delete
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(BlobError::Io(err)),
                };
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    let Ok(key) = urlencoding::decode(name) else { continue };
                    if key.starts_with(prefix) {
                        keys.insert(key.into_owned());
                    }
                }
            }
        }
        Ok(keys.into_iter().collect())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let file_path = self.object_path(key)?;
        Ok(fs::try_exists(&file_path).await?)
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, DiskBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_overwrite() {
        let (_dir, store) = store();
        store.put("a/b", Bytes::from_static(b"one")).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"one"));

        store.put("a/b", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn object_and_chunk_keys_coexist() {
        let (_dir, store) = store();
        store.put("U/chunk_1", Bytes::from_static(b"c1")).await.unwrap();
        store.put("U", Bytes::from_static(b"whole")).await.unwrap();

        assert_eq!(store.get("U").await.unwrap(), Bytes::from_static(b"whole"));
        assert_eq!(store.get("U/chunk_1").await.unwrap(), Bytes::from_static(b"c1"));
    }

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let (_dir, store) = store();
        assert!(store.get("nope").await.unwrap_err().is_not_found());
        assert!(store.delete("nope").await.unwrap_err().is_not_found());
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_prefix_and_sorts() {
        let (_dir, store) = store();
        for key in ["f/b", "f/a", "f/c/chunk_2", "g/a", "fx"] {
            store.put(key, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(
            store.list("f/").await.unwrap(),
            vec!["f/a", "f/b", "f/c/chunk_2"]
        );
        assert_eq!(store.list("").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn list_on_empty_root() {
        let dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new(dir.path().join("not-created"));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_prunes_shard_dirs() {
        let (dir, store) = store();
        store.put("only", Bytes::from_static(b"x")).await.unwrap();
        store.delete("only").await.unwrap();

        let (shard_a, _) = DiskBlobStore::object_shards("only");
        assert!(!dir.path().join(shard_a).exists());
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn staging_files_never_listed() {
        let (dir, store) = store();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();
        std::fs::write(dir.path().join(STAGING_DIR).join(".tmp-leftover"), b"junk").unwrap();
        assert_eq!(store.list("").await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn rejects_unsafe_keys() {
        let (_dir, store) = store();
        let err = store.put("../escape", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn empty_values_round_trip() {
        let (_dir, store) = store();
        store.put("empty", Bytes::new()).await.unwrap();
        assert!(store.get("empty").await.unwrap().is_empty());
        assert!(store.exists("empty").await.unwrap());
    }
}

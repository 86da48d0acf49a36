//! Chunk naming: upload identifiers, chunk ordinals, and the keys derived
//! from them.
//!
//! Every chunk of an upload lives at `{upload_id}/chunk_{index}` and the
//! assembled object lives at `{upload_id}`. No other index exists; these keys
//! are the only way chunks are located, enumerated, and deleted.

use super::manifest::MAX_CHUNKS;
use crate::services::blob_store::ensure_key_portable;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Segment prefix of a chunk key, e.g. `chunk_7`.
pub const CHUNK_SEGMENT_PREFIX: &str = "chunk_";

/// Marker separating a logical file name from its ordinal in batch names,
/// e.g. `report.pdf._part_3`.
pub const PART_MARKER: &str = "._part_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("upload identifier must not be empty")]
    EmptyUploadId,
    #[error("upload identifier `{0}` must not begin or end with `/`")]
    UnanchoredUploadId(String),
    #[error("upload identifier `{0}` is not a usable storage key")]
    InvalidUploadId(String),
    #[error("upload identifier `{0}` must not end in a chunk segment like `chunk_1`")]
    ChunkSegmentUploadId(String),
    #[error("chunk number must be at least 1")]
    ZeroIndex,
}

/// Opaque identifier grouping all chunks of one logical file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NameError::EmptyUploadId);
        }
        if value.starts_with('/') || value.ends_with('/') {
            return Err(NameError::UnanchoredUploadId(value));
        }
        // `a/U/chunk_3` would publish onto chunk 3 of upload `a/U`
        let last = value.rsplit('/').next().unwrap_or_default();
        if last
            .strip_prefix(CHUNK_SEGMENT_PREFIX)
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(NameError::ChunkSegmentUploadId(value));
        }
        // the longest chunk key of the upload must still be storable
        let longest = format!("{}/{}{}", value, CHUNK_SEGMENT_PREFIX, MAX_CHUNKS);
        if ensure_key_portable(&longest).is_err() {
            return Err(NameError::InvalidUploadId(value));
        }
        Ok(Self(value))
    }

    /// Upload identifier for `name` inside `folder`, i.e. `folder/name`.
    pub fn scoped(folder: &str, name: &str) -> Result<Self, NameError> {
        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            return Self::new(name);
        }
        Self::new(format!("{}/{}", folder, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the assembled object for this upload.
    pub fn object_key(&self) -> String {
        self.0.clone()
    }

    /// Prefix shared by every chunk key of this upload.
    pub fn chunk_prefix(&self) -> String {
        format!("{}/{}", self.0, CHUNK_SEGMENT_PREFIX)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1-based position of a chunk within its upload.
///
/// Ordering is numeric, so `2 < 10` even though `"10" < "2"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChunkIndex(u32);

impl ChunkIndex {
    pub fn new(value: u32) -> Result<Self, NameError> {
        if value == 0 {
            return Err(NameError::ZeroIndex);
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key under which chunk `index` of `upload_id` is stored.
pub fn chunk_key(upload_id: &UploadId, index: ChunkIndex) -> String {
    format!("{}{}", upload_id.chunk_prefix(), index)
}

/// Recover the chunk index from a key, if the key is a chunk of `upload_id`.
pub fn parse_chunk_key(upload_id: &UploadId, key: &str) -> Option<ChunkIndex> {
    let digits = key.strip_prefix(&upload_id.chunk_prefix())?;
    parse_ordinal(digits)
}

/// A batch chunk name of the form `<file>._part_<n>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartName {
    pub file: String,
    pub index: ChunkIndex,
}

impl PartName {
    /// Parse a batch chunk name.
    ///
    /// The logical file is everything before the last `._part_` marker and
    /// must be non-empty. The ordinal must be plain ASCII digits, at least 1.
    pub fn parse(name: &str) -> Option<Self> {
        let pos = name.rfind(PART_MARKER)?;
        let file = &name[..pos];
        if file.is_empty() {
            return None;
        }
        let index = parse_ordinal(&name[pos + PART_MARKER.len()..])?;
        Some(Self {
            file: file.to_string(),
            index,
        })
    }
}

fn parse_ordinal(digits: &str) -> Option<ChunkIndex> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().and_then(|n| ChunkIndex::new(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: u32) -> ChunkIndex {
        ChunkIndex::new(n).unwrap()
    }

    #[test]
    fn chunk_keys_are_scoped_to_the_upload() {
        let id = UploadId::new("photos/trip").unwrap();
        assert_eq!(chunk_key(&id, idx(3)), "photos/trip/chunk_3");
        assert_eq!(id.object_key(), "photos/trip");
        assert_eq!(parse_chunk_key(&id, "photos/trip/chunk_12"), Some(idx(12)));
        assert_eq!(parse_chunk_key(&id, "photos/trips/chunk_1"), None);
        assert_eq!(parse_chunk_key(&id, "photos/trip/chunk_"), None);
        assert_eq!(parse_chunk_key(&id, "photos/trip/chunk_0"), None);
    }

    #[test]
    fn indices_order_numerically() {
        let mut v = vec![idx(10), idx(2), idx(11), idx(1)];
        v.sort();
        assert_eq!(v, vec![idx(1), idx(2), idx(10), idx(11)]);
    }

    #[test]
    fn zero_index_rejected() {
        assert_eq!(ChunkIndex::new(0), Err(NameError::ZeroIndex));
    }

    #[test]
    fn upload_id_validation() {
        assert_eq!(UploadId::new(""), Err(NameError::EmptyUploadId));
        assert!(UploadId::new("/abs").is_err());
        assert!(UploadId::new("dir/").is_err());
        assert_eq!(UploadId::scoped("docs/", "a.bin").unwrap().as_str(), "docs/a.bin");
        assert_eq!(UploadId::scoped("", "a.bin").unwrap().as_str(), "a.bin");
    }

    #[test]
    fn upload_ids_must_be_storable() {
        for bad in ["..", "a/../b", "a//b", "./x", "tab\there", "back\\slash"] {
            assert_eq!(
                UploadId::new(bad),
                Err(NameError::InvalidUploadId(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(
            UploadId::scoped("a", ".."),
            Err(NameError::InvalidUploadId(_))
        ));
        let long = "k".repeat(250);
        assert!(matches!(UploadId::new(long), Err(NameError::InvalidUploadId(_))));
        assert!(UploadId::new("k".repeat(200)).is_ok());
    }

    #[test]
    fn upload_ids_cannot_shadow_chunk_keys() {
        assert_eq!(
            UploadId::scoped("f/A", "chunk_1"),
            Err(NameError::ChunkSegmentUploadId("f/A/chunk_1".into()))
        );
        assert!(UploadId::new("chunk_12").is_err());
        assert!(UploadId::new("f/chunk_notes").is_ok());
        assert!(UploadId::new("f/chunk_").is_ok());
        assert!(UploadId::new("chunk_1/notes").is_ok());
    }

    #[test]
    fn part_names_split_on_last_marker() {
        let part = PartName::parse("video.mp4._part_10").unwrap();
        assert_eq!(part.file, "video.mp4");
        assert_eq!(part.index, idx(10));

        let nested = PartName::parse("a._part_b._part_2").unwrap();
        assert_eq!(nested.file, "a._part_b");
        assert_eq!(nested.index, idx(2));
    }

    #[test]
    fn malformed_part_names_rejected() {
        for name in [
            "video.mp4",
            "._part_1",
            "video._part_",
            "video._part_x",
            "video._part_0",
            "video._part_+1",
            "video._part_1 ",
        ] {
            assert!(PartName::parse(name).is_none(), "{name} should be rejected");
        }
    }
}

//! Results of assembly requests, as returned to callers.

use super::chunk::ChunkIndex;
use serde::Serialize;

/// Successful result of assembling one upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssemblyOutcome {
    /// The object was built from its chunks and published.
    Assembled {
        object_key: String,
        chunk_count: usize,
        size_bytes: u64,
        /// Chunk keys that could not be removed after publishing.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        cleanup_failures: Vec<String>,
    },
    /// The object had already been published by an earlier call.
    AlreadyAssembled { object_key: String },
}

impl AssemblyOutcome {
    pub fn object_key(&self) -> &str {
        match self {
            AssemblyOutcome::Assembled { object_key, .. }
            | AssemblyOutcome::AlreadyAssembled { object_key } => object_key,
        }
    }
}

/// Per logical file result of a batch assembly.
#[derive(Clone, Debug, Serialize)]
pub struct GroupReport {
    pub file: String,
    #[serde(flatten)]
    pub result: GroupResult,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum GroupResult {
    Ok(AssemblyOutcome),
    Failed(GroupFailure),
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupFailure {
    pub status: &'static str,
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<ChunkIndex>,
}

impl GroupReport {
    pub fn is_ok(&self) -> bool {
        matches!(self.result, GroupResult::Ok(_))
    }
}

//! Manifests: the caller's statement of which chunks make up a complete
//! upload, and the grouping rule for batch requests.

use super::chunk::{ChunkIndex, PartName};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Largest chunk count or ordinal a manifest may name.
pub const MAX_CHUNKS: u32 = 100_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest must name at least one chunk")]
    Empty,
    #[error("chunk {0} listed more than once")]
    Duplicate(ChunkIndex),
    #[error("manifest skips chunk(s) {}", join_indices(.0))]
    Gap(Vec<ChunkIndex>),
    #[error("manifest names chunk {0}, above the limit of {max}", max = MAX_CHUNKS)]
    TooLarge(u32),
    #[error("malformed chunk name(s): {}", .0.join(", "))]
    MalformedName(Vec<String>),
}

/// What "complete" means for one upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Manifest {
    /// Indices `1..=n`.
    Count(u32),
    /// An explicit set of indices, in any order.
    Indices(Vec<ChunkIndex>),
}

impl Manifest {
    /// Resolve into the expected indices in ascending numeric order.
    ///
    /// Explicit lists must be contiguous from 1 so an object is never
    /// published with a part silently left out.
    pub fn resolve(&self) -> Result<Vec<ChunkIndex>, ManifestError> {
        match self {
            Manifest::Count(0) => Err(ManifestError::Empty),
            Manifest::Count(n) if *n > MAX_CHUNKS => Err(ManifestError::TooLarge(*n)),
            Manifest::Count(n) => Ok((1..=*n)
                .filter_map(|i| ChunkIndex::new(i).ok())
                .collect()),
            Manifest::Indices(list) => {
                if list.is_empty() {
                    return Err(ManifestError::Empty);
                }
                let mut seen = BTreeSet::new();
                for index in list {
                    if !seen.insert(*index) {
                        return Err(ManifestError::Duplicate(*index));
                    }
                }
                let highest = seen.last().map(|i| i.get()).unwrap_or(0);
                if highest > MAX_CHUNKS {
                    return Err(ManifestError::TooLarge(highest));
                }
                let gaps: Vec<ChunkIndex> = (1..=highest)
                    .filter_map(|i| ChunkIndex::new(i).ok())
                    .filter(|i| !seen.contains(i))
                    .collect();
                if !gaps.is_empty() {
                    return Err(ManifestError::Gap(gaps));
                }
                Ok(seen.into_iter().collect())
            }
        }
    }
}

/// Group batch chunk names by logical file.
///
/// Every name is validated first; one malformed name rejects the request.
/// The resulting manifests are not resolved here, so duplicate or missing
/// ordinals surface per group when each is assembled.
pub fn group_part_names<S: AsRef<str>>(
    names: &[S],
) -> Result<BTreeMap<String, Manifest>, ManifestError> {
    let mut malformed = Vec::new();
    let mut groups: BTreeMap<String, Vec<ChunkIndex>> = BTreeMap::new();

    for name in names {
        let name = name.as_ref();
        match PartName::parse(name) {
            Some(part) => groups.entry(part.file).or_default().push(part.index),
            None => malformed.push(name.to_string()),
        }
    }

    if !malformed.is_empty() {
        return Err(ManifestError::MalformedName(malformed));
    }
    if groups.is_empty() {
        return Err(ManifestError::Empty);
    }

    Ok(groups
        .into_iter()
        .map(|(file, indices)| (file, Manifest::Indices(indices)))
        .collect())
}

fn join_indices(indices: &[ChunkIndex]) -> String {
    indices
        .iter()
        .map(ChunkIndex::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: u32) -> ChunkIndex {
        ChunkIndex::new(n).unwrap()
    }

    #[test]
    fn count_resolves_in_numeric_order() {
        let resolved = Manifest::Count(11).resolve().unwrap();
        let numbers: Vec<u32> = resolved.iter().map(|i| i.get()).collect();
        assert_eq!(numbers, (1..=11).collect::<Vec<_>>());
    }

    #[test]
    fn zero_count_is_empty() {
        assert_eq!(Manifest::Count(0).resolve(), Err(ManifestError::Empty));
    }

    #[test]
    fn explicit_list_is_sorted() {
        let manifest = Manifest::Indices(vec![idx(3), idx(11), idx(1), idx(2)]);
        let err = manifest.resolve().unwrap_err();
        assert!(matches!(err, ManifestError::Gap(ref g) if g.len() == 7));

        let manifest = Manifest::Indices(vec![idx(3), idx(1), idx(2)]);
        assert_eq!(manifest.resolve().unwrap(), vec![idx(1), idx(2), idx(3)]);
    }

    #[test]
    fn oversized_manifests_rejected() {
        assert_eq!(
            Manifest::Count(MAX_CHUNKS + 1).resolve(),
            Err(ManifestError::TooLarge(MAX_CHUNKS + 1))
        );
        assert_eq!(
            Manifest::Indices(vec![idx(1), idx(u32::MAX)]).resolve(),
            Err(ManifestError::TooLarge(u32::MAX))
        );
    }

    #[test]
    fn explicit_list_rejects_duplicates_and_gaps() {
        assert_eq!(
            Manifest::Indices(vec![idx(1), idx(2), idx(2)]).resolve(),
            Err(ManifestError::Duplicate(idx(2)))
        );
        assert_eq!(
            Manifest::Indices(vec![idx(1), idx(4)]).resolve(),
            Err(ManifestError::Gap(vec![idx(2), idx(3)]))
        );
        assert_eq!(
            Manifest::Indices(vec![]).resolve(),
            Err(ManifestError::Empty)
        );
    }

    #[test]
    fn groups_by_logical_file() {
        let groups =
            group_part_names(&["B._part_1", "A._part_2", "A._part_1"]).unwrap();
        let files: Vec<&str> = groups.keys().map(String::as_str).collect();
        assert_eq!(files, vec!["A", "B"]);
        assert_eq!(
            groups["A"].resolve().unwrap(),
            vec![idx(1), idx(2)]
        );
        assert_eq!(groups["B"].resolve().unwrap(), vec![idx(1)]);
    }

    #[test]
    fn malformed_names_reject_the_batch() {
        let err = group_part_names(&["A._part_1", "notes.txt", "B._part_x"]).unwrap_err();
        assert_eq!(
            err,
            ManifestError::MalformedName(vec!["notes.txt".into(), "B._part_x".into()])
        );
    }

    #[test]
    fn empty_batch_rejected() {
        let names: [&str; 0] = [];
        assert_eq!(group_part_names(&names), Err(ManifestError::Empty));
    }

    #[test]
    fn oversized_manifest_names_the_limit() {
        let message = ManifestError::TooLarge(MAX_CHUNKS + 1).to_string();
        assert_eq!(message, "manifest names chunk 100001, above the limit of 100000");
    }
}

//! Duplicate groups, original selection and the consumed set.
//!
//! # Overview
//!
//! A [`DuplicateGroup`] is one original plus the files that duplicate it.
//! Every pass builds its groups through [`select_original`], so all groups
//! follow the same rule: the largest file is kept, ties broken by the
//! lexicographically smallest path.
//!
//! A file belongs to at most one group per run. The [`ConsumedSet`] records
//! every path already placed in a group so later passes skip it.
//!
//! # Example
//!
//! ```
//! use photodupe::duplicates::{select_original, MatchKind};
//! use photodupe::scanner::FileRecord;
//!
//! let group = select_original(
//!     vec![
//!         FileRecord::with_size("/photos/b.jpg", 100),
//!         FileRecord::with_size("/photos/a.jpg", 100),
//!         FileRecord::with_size("/photos/c.jpg", 50),
//!     ],
//!     MatchKind::Exact,
//! )
//! .unwrap();
//!
//! assert_eq!(group.original.path.to_str(), Some("/photos/a.jpg"));
//! assert_eq!(group.duplicates.len(), 2);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scanner::FileRecord;

/// Which pass produced a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Byte-identical content
    Exact,
    /// Visually similar images
    Perceptual,
    /// Videos with matching sampled frames
    Video,
}

impl MatchKind {
    /// Lowercase name used in reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Perceptual => "perceptual",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An original file and the files that duplicate it.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// The file that is kept
    pub original: FileRecord,
    /// Files to be removed or moved, sorted by path
    pub duplicates: Vec<FileRecord>,
    /// Pass that produced this group
    pub kind: MatchKind,
}

impl DuplicateGroup {
    /// Number of files in the group, original included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.duplicates.len() + 1
    }

    /// A group always contains at least its original.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of duplicate files (excluding the original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    /// Bytes freed by removing every duplicate.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.duplicates.iter().map(FileRecord::size).sum()
    }

    /// All files of the group, original first.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        std::iter::once(&self.original).chain(self.duplicates.iter())
    }

    /// All paths of the group, original first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files().map(|f| f.path.as_path())
    }

    /// Check whether the group contains a file with this path.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths().any(|p| p == path)
    }
}

/// Order files by size descending, then path ascending.
fn original_order(a: &FileRecord, b: &FileRecord) -> std::cmp::Ordering {
    b.size().cmp(&a.size()).then_with(|| a.path.cmp(&b.path))
}

/// Build a group from its members, choosing the original.
///
/// The original is the largest file; equal sizes are resolved by the
/// smallest path. The remaining files become the duplicates, ordered by
/// path. Duplicate paths in `members` are collapsed. Returns `None` when
/// fewer than two distinct files remain.
#[must_use]
pub fn select_original(mut members: Vec<FileRecord>, kind: MatchKind) -> Option<DuplicateGroup> {
    members.sort_by(original_order);
    members.dedup_by(|a, b| a.path == b.path);

    if members.len() < 2 {
        return None;
    }

    let original = members.remove(0);
    members.sort_by(|a, b| a.path.cmp(&b.path));
    Some(DuplicateGroup {
        original,
        duplicates: members,
        kind,
    })
}

/// Group files sharing an equal key into duplicate groups.
///
/// Keys with a single file produce no group. Output is sorted by original
/// path so results do not depend on input order.
#[must_use]
pub fn group_by_key<K>(
    entries: impl IntoIterator<Item = (FileRecord, K)>,
    kind: MatchKind,
) -> Vec<DuplicateGroup>
where
    K: Hash + Eq,
{
    let mut buckets: HashMap<K, Vec<FileRecord>> = HashMap::new();
    for (file, key) in entries {
        buckets.entry(key).or_default().push(file);
    }

    let mut groups: Vec<DuplicateGroup> = buckets
        .into_values()
        .filter_map(|members| select_original(members, kind))
        .collect();
    sort_groups(&mut groups);
    groups
}

/// Sort groups by original path.
pub fn sort_groups(groups: &mut [DuplicateGroup]) {
    groups.sort_by(|a, b| a.original.path.cmp(&b.original.path));
}

/// Paths already placed in a group during this run.
#[derive(Debug, Clone, Default)]
pub struct ConsumedSet {
    paths: HashSet<PathBuf>,
}

impl ConsumedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a path has already been grouped.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Record every member of the group, original included.
    pub fn consume(&mut self, group: &DuplicateGroup) {
        for path in group.paths() {
            self.paths.insert(path.to_path_buf());
        }
    }

    /// Record every member of every group.
    pub fn consume_all(&mut self, groups: &[DuplicateGroup]) {
        for group in groups {
            self.consume(group);
        }
    }

    /// Copy out the files that have not been grouped yet.
    #[must_use]
    pub fn unconsumed(&self, files: &[FileRecord]) -> Vec<FileRecord> {
        files
            .iter()
            .filter(|f| !self.contains(&f.path))
            .cloned()
            .collect()
    }

    /// Number of consumed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if nothing has been consumed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Counters for one pass, logged when the pass ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Files handed to the pass
    pub candidates: usize,
    /// Files whose fingerprint could not be computed
    pub failed: usize,
    /// Groups produced
    pub groups: usize,
    /// Duplicate files in those groups
    pub duplicates: usize,
}

impl PassStats {
    /// Fill the group counters from the pass output.
    #[must_use]
    pub fn with_groups(mut self, groups: &[DuplicateGroup]) -> Self {
        self.groups = groups.len();
        self.duplicates = groups.iter().map(DuplicateGroup::duplicate_count).sum();
        self
    }
}

//! Storage and upstream-oracle seams.
//!
//! Every trait here is object-safe, so the engine crate can be handed a
//! `&dyn AnnotationStore` / `&dyn ChangelogOracle` at construction time and
//! stay oblivious to whether the backing implementation is the in-memory
//! `tuid-storage` store, a persistent one, or a test double.

use crate::error::Result;
use crate::types::{Annotation, AnnotationKey, ChangelogRange, Diff, FileKey, RevisionId, RevisionPhase};

/// Durable store for `(revision, file) -> Annotation` records (spec §3 / C2).
pub trait AnnotationStore: Send + Sync {
    /// Look up an existing annotation.
    fn get(&self, key: &AnnotationKey) -> Option<Annotation>;

    /// Insert `annotation` under `key` iff no entry is present yet.
    ///
    /// Returns `true` if this call's annotation was the one stored, `false`
    /// if another writer had already inserted first. Callers must never
    /// persist anything derived from a losing write (spec §4.5's
    /// "double-check" protocol / I2 monotonicity).
    fn insert_if_absent(&self, key: AnnotationKey, annotation: Annotation) -> bool;

    /// True iff an annotation is already stored for `key`.
    fn contains(&self, key: &AnnotationKey) -> bool;
}

/// Durable store for `file -> latest known revision` records (spec §3 / C3).
pub trait FrontierStore: Send + Sync {
    /// The most recent revision this file's annotation chain has been
    /// advanced to, if any.
    fn get_frontier(&self, file: &FileKey) -> Option<RevisionId>;

    /// Advance (or set) the frontier for `file`.
    fn set_frontier(&self, file: FileKey, revision: RevisionId);

    /// Every tracked `(file, frontier)` pair (spec §4.9: "read all (file,
    /// frontier) pairs from C3"). Order is unspecified.
    fn all(&self) -> Vec<(FileKey, RevisionId)>;
}

/// Durable persistence for the TUID allocator's high-water mark (spec §4.1 /
/// C1, I6 monotonicity).
pub trait CounterPersistence: Send + Sync {
    /// Load the last persisted high-water mark, or `0` if none has ever
    /// been written.
    fn load(&self) -> Result<u64>;

    /// Durably persist a new high-water mark. Must not return `Ok` until
    /// the value is safe to hand out TUIDs above.
    fn persist(&self, high_water_mark: u64) -> Result<()>;
}

/// Source of revision-ordering information: the Changelog Oracle (spec §3 /
/// §6).
pub trait ChangelogOracle: Send + Sync {
    /// The connecting range of revisions from `from` (exclusive) to `to`
    /// (inclusive), oldest first. Used by the Frontier Mover (C6) to walk
    /// diffs one changeset at a time.
    fn range(&self, from: &RevisionId, to: &RevisionId) -> Result<ChangelogRange>;

    /// The most recent revision known on `branch` (used by the Prefetch
    /// Daemon, C9).
    fn tip(&self, branch: &str) -> Result<RevisionId>;

    /// Public/Draft phase of a revision (spec glossary; used by the
    /// Try-Branch Resolver, C8, to find the public ancestor to replay from).
    fn phase(&self, revision: &RevisionId) -> Result<RevisionPhase>;

    /// Revisions pushed to an ephemeral "try" push matching `changeset`
    /// (spec §4.8, `json-pushes?full=1&changeset=`), oldest first.
    fn pushes(&self, changeset: &RevisionId) -> Result<Vec<RevisionId>>;

    /// True iff `revision` exists on `branch` (spec §4.7's branch guard:
    /// "verify the revision exists in the default branch via `json-log`").
    fn exists_on_branch(&self, branch: &str, revision: &RevisionId) -> Result<bool>;

    /// `revision`'s parent revisions, oldest-first as `json-rev` reports
    /// them (spec §4.8 step 2: a push's first changeset's first parent is
    /// the public ancestor; pushes with more than one parent are rejected).
    fn parents(&self, revision: &RevisionId) -> Result<Vec<RevisionId>>;
}

/// Source of per-revision line-change records: the Diff Oracle (spec §3 /
/// §6).
pub trait DiffOracle: Send + Sync {
    /// The diff introduced by `revision` relative to its parent.
    fn diff(&self, revision: &RevisionId) -> Result<Diff>;
}

/// Source of whole-file line counts at a revision: the Raw File Oracle
/// (spec §3 / §6, used by the Annotation Acquirer, C5).
pub trait RawFileOracle: Send + Sync {
    /// Number of lines `file` has at `revision`. Used to size a freshly
    /// acquired annotation before TUIDs are allocated for it.
    fn line_count(&self, revision: &RevisionId, file: &FileKey) -> Result<usize>;
}

/// Source of a revision's full file list: the `json-info` endpoint (spec
/// §6, backing the `resolve_revision` convenience downstream operation).
pub trait FileListOracle: Send + Sync {
    /// Every file present at `revision`.
    fn files_at(&self, revision: &RevisionId) -> Result<Vec<FileKey>>;
}

/// Optional filter narrowing which revisions the Prefetch Daemon (C9)
/// considers worth advancing frontiers toward (spec §4.9's "optional
/// coverage-revision filtering").
pub trait CoverageIndex: Send + Sync {
    /// True iff `revision` should be included in prefetch advancement.
    fn covers(&self, revision: &RevisionId) -> bool;
}

impl CounterPersistence for Box<dyn CounterPersistence> {
    fn load(&self) -> Result<u64> {
        (**self).load()
    }

    fn persist(&self, high_water_mark: u64) -> Result<()> {
        (**self).persist(high_water_mark)
    }
}

/// Default [`CoverageIndex`] that admits every revision, used when no
/// coverage filtering is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllRevisionsCoverageIndex;

impl CoverageIndex for AllRevisionsCoverageIndex {
    fn covers(&self, _revision: &RevisionId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_revisions_coverage_index_admits_everything() {
        let index = AllRevisionsCoverageIndex;
        assert!(index.covers(&RevisionId::new("deadbeefcafe")));
    }
}

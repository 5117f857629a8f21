//! In-memory Annotation and Frontier stores.
//!
//! `DashMap` gives lock-free reads and per-shard write locking out of the
//! box, so there's no need for the hand-rolled branch-sharding the teacher
//! crate layers on top for its own key space — an `AnnotationKey` already
//! has good hash distribution across revisions and files.

#![warn(missing_docs)]
#![warn(clippy::all)]

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tuid_core::traits::{AnnotationStore, FrontierStore};
use tuid_core::types::{Annotation, AnnotationKey, FileKey, RevisionId};

/// `DashMap`-backed [`AnnotationStore`] (spec §3 / C2).
///
/// Implements the "first committer wins" double-check protocol required by
/// C5's Annotation Acquirer: [`InMemoryAnnotationStore::insert_if_absent`]
/// only stores a value when the key is still vacant, and reports whether
/// this call's write won the race.
#[derive(Debug, Default)]
pub struct InMemoryAnnotationStore {
    entries: DashMap<AnnotationKey, Annotation, FxBuildHasher>,
}

impl InMemoryAnnotationStore {
    /// An empty store.
    pub fn new() -> Self {
        InMemoryAnnotationStore {
            entries: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Number of stored annotations, mostly for tests and metrics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff no annotations are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AnnotationStore for InMemoryAnnotationStore {
    fn get(&self, key: &AnnotationKey) -> Option<Annotation> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn insert_if_absent(&self, key: AnnotationKey, annotation: Annotation) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => {
                tracing::debug!("annotation already present, discarding losing write");
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(annotation);
                true
            }
        }
    }

    fn contains(&self, key: &AnnotationKey) -> bool {
        self.entries.contains_key(key)
    }
}

/// `DashMap`-backed [`FrontierStore`] (spec §3 / C3).
///
/// A frontier is a single revision per file; writes always overwrite, the
/// "never move frontier backward" policy lives in the Frontier Mover (C6),
/// not in this store.
#[derive(Debug, Default)]
pub struct InMemoryFrontierStore {
    frontiers: DashMap<FileKey, RevisionId, FxBuildHasher>,
}

impl InMemoryFrontierStore {
    /// An empty store.
    pub fn new() -> Self {
        InMemoryFrontierStore {
            frontiers: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Number of tracked files, mostly for tests and metrics.
    pub fn len(&self) -> usize {
        self.frontiers.len()
    }

    /// True iff no frontiers are tracked.
    pub fn is_empty(&self) -> bool {
        self.frontiers.is_empty()
    }
}

impl FrontierStore for InMemoryFrontierStore {
    fn get_frontier(&self, file: &FileKey) -> Option<RevisionId> {
        self.frontiers.get(file).map(|entry| entry.value().clone())
    }

    fn set_frontier(&self, file: FileKey, revision: RevisionId) {
        self.frontiers.insert(file, revision);
    }

    fn all(&self) -> Vec<(FileKey, RevisionId)> {
        self.frontiers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

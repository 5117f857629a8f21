//! C6: walks a bounded range of revisions from a file's frontier to a
//! target revision, applying diffs one changeset at a time.
//!
//! The hardest component per the spec, grounded on `_update_file_frontiers`
//! in the original service. Diffs are fetched once per revision and shared
//! across every file touched by that revision in the batch; every
//! successfully-applied intermediate step is written back to the
//! Annotation Store so later queries at that point are cache hits (and so
//! a later backward walk across the same span can read exact history
//! instead of falling back to [`crate::diff_applier::apply_backward`]'s
//! best-effort reinsertion).

use crate::diff_applier::{apply_backward, apply_forward};
use std::collections::HashMap;
use std::sync::Arc;
use tuid_concurrency::TuidAllocator;
use tuid_core::error::Result;
use tuid_core::traits::{AnnotationStore, ChangelogOracle, CounterPersistence, DiffOracle, FrontierStore};
use tuid_core::types::{Annotation, AnnotationKey, ChangelogRange, Diff, FileKey, RevisionId};

/// Per-file outcome of a frontier move attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The frontier reached `target` with this annotation.
    Moved(Annotation),
    /// The walk could not complete; the file should be routed to the
    /// Annotation Acquirer (C5) instead.
    NeedsReannotation,
}

struct FileWalk {
    file: FileKey,
    old_frontier: RevisionId,
    path: ChangelogRange,
    forward: bool,
}

/// C6's batch frontier walker.
pub struct FrontierMover<P: CounterPersistence> {
    changelog: Arc<dyn ChangelogOracle>,
    diffs: Arc<dyn DiffOracle>,
    store: Arc<dyn AnnotationStore>,
    frontiers: Arc<dyn FrontierStore>,
    allocator: Arc<TuidAllocator<P>>,
    max_csets_proc: usize,
}

impl<P: CounterPersistence> FrontierMover<P> {
    /// Build a mover over the given collaborators.
    pub fn new(
        changelog: Arc<dyn ChangelogOracle>,
        diffs: Arc<dyn DiffOracle>,
        store: Arc<dyn AnnotationStore>,
        frontiers: Arc<dyn FrontierStore>,
        allocator: Arc<TuidAllocator<P>>,
        max_csets_proc: usize,
    ) -> Self {
        FrontierMover {
            changelog,
            diffs,
            store,
            frontiers,
            allocator,
            max_csets_proc,
        }
    }

    /// Clone this mover with a different per-call step bound (used by the
    /// Request Coordinator, C7, when a caller overrides `max_csets_proc`).
    pub fn with_max_csets_proc(&self, max_csets_proc: usize) -> Self {
        FrontierMover {
            changelog: self.changelog.clone(),
            diffs: self.diffs.clone(),
            store: self.store.clone(),
            frontiers: self.frontiers.clone(),
            allocator: self.allocator.clone(),
            max_csets_proc,
        }
    }

    /// Move every `(file, old_frontier)` pair toward `target` (spec §4.6).
    pub fn move_files(
        &self,
        items: &[(FileKey, RevisionId)],
        target: &RevisionId,
        going_forward: bool,
    ) -> Vec<(FileKey, MoveOutcome)> {
        let walks: Vec<FileWalk> = items
            .iter()
            .filter_map(|(file, old_frontier)| {
                self.compute_path(file, old_frontier, target)
                    .map(|(path, forward)| FileWalk {
                        file: file.clone(),
                        old_frontier: old_frontier.clone(),
                        path,
                        forward,
                    })
            })
            .collect();

        let mut diff_cache: HashMap<RevisionId, Diff> = HashMap::new();
        let all_revisions: Vec<RevisionId> = walks
            .iter()
            .flat_map(|w| w.path.revisions().cloned())
            .collect();
        for revision in all_revisions {
            if diff_cache.contains_key(&revision) {
                continue;
            }
            match self.diffs.diff(&revision) {
                Ok(diff) => {
                    diff_cache.insert(revision, diff);
                }
                Err(err) => {
                    tracing::warn!(%revision, error = %err, "failed to fetch diff");
                }
            }
        }

        items
            .iter()
            .map(|(file, old_frontier)| {
                let walk = walks
                    .iter()
                    .find(|w| &w.file == file && &w.old_frontier == old_frontier);
                let outcome = match walk {
                    Some(walk) => self.walk_one(walk, target, going_forward, &diff_cache),
                    None => MoveOutcome::NeedsReannotation,
                };
                (file.clone(), outcome)
            })
            .collect()
    }

    fn compute_path(
        &self,
        _file: &FileKey,
        old_frontier: &RevisionId,
        target: &RevisionId,
    ) -> Option<(ChangelogRange, bool)> {
        if old_frontier == target {
            return Some((ChangelogRange::default(), true));
        }
        let (lo, hi, forward) = (old_frontier.clone(), target.clone(), true);
        match self.changelog.range(&lo, &hi) {
            Ok(range) if !range.is_empty() => Some((range, forward)),
            _ => match self.changelog.range(target, old_frontier) {
                Ok(range) if !range.is_empty() => Some((range.reversed(), false)),
                _ => None,
            },
        }
    }

    fn walk_one(
        &self,
        walk: &FileWalk,
        target: &RevisionId,
        going_forward: bool,
        diff_cache: &HashMap<RevisionId, Diff>,
    ) -> MoveOutcome {
        if walk.path.is_empty() {
            let key = AnnotationKey::new(walk.old_frontier.clone(), walk.file.clone());
            return match self.store.get(&key) {
                Some(annotation) => {
                    self.frontiers.set_frontier(walk.file.clone(), target.clone());
                    MoveOutcome::Moved(annotation)
                }
                None => MoveOutcome::NeedsReannotation,
            };
        }

        let source_key = AnnotationKey::new(walk.old_frontier.clone(), walk.file.clone());
        let mut annotation = match self.store.get(&source_key) {
            Some(ann) => ann,
            None => return MoveOutcome::NeedsReannotation,
        };
        let mut current_file = walk.file.clone();

        let steps: Vec<&RevisionId> = walk.path.revisions().collect();
        let bounded = steps.len() > self.max_csets_proc;
        let steps = if bounded {
            &steps[..self.max_csets_proc]
        } else {
            &steps[..]
        };

        for (idx, revision) in steps.iter().enumerate() {
            let diff = match diff_cache.get(*revision) {
                Some(diff) => diff,
                None => return MoveOutcome::NeedsReannotation,
            };
            let result = if walk.forward {
                apply_forward(&annotation, diff, &current_file, &self.allocator)
            } else {
                apply_backward(&annotation, diff, &current_file, &self.allocator)
            };
            match result {
                Ok((next_annotation, next_file)) => {
                    // Forward: the diff at `revision` turns its parent into
                    // `revision` itself, so the result belongs there.
                    // Backward: the diff at `revision` turns `revision` back
                    // into its parent, which is the *next* step in this
                    // (already-reversed) walk, or `target` on the last step.
                    let store_revision = if walk.forward {
                        (*revision).clone()
                    } else {
                        steps.get(idx + 1).map(|r| (*r).clone()).unwrap_or_else(|| target.clone())
                    };
                    let key = AnnotationKey::new(store_revision, next_file.clone());
                    if self.store.insert_if_absent(key.clone(), next_annotation.clone()) {
                        annotation = next_annotation;
                    } else {
                        annotation = self
                            .store
                            .get(&key)
                            .expect("insert_if_absent lost the race, so a value must be present");
                    }
                    current_file = next_file;
                }
                Err(err) => {
                    tracing::warn!(
                        file = %walk.file,
                        old_frontier = %walk.old_frontier,
                        target = %target,
                        step = %revision,
                        error = %err,
                        "frontier move step failed"
                    );
                    if going_forward {
                        self.frontiers.set_frontier(walk.file.clone(), target.clone());
                    }
                    return MoveOutcome::NeedsReannotation;
                }
            }
        }

        if bounded {
            if going_forward {
                self.frontiers.set_frontier(walk.file.clone(), target.clone());
                return MoveOutcome::Moved(annotation);
            }
            return MoveOutcome::NeedsReannotation;
        }

        self.frontiers.set_frontier(walk.file.clone(), target.clone());
        MoveOutcome::Moved(annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tuid_core::error::Result as CoreResult;
    use tuid_core::types::{ChangeAction, ChangeOp, ChangelogStep, FileDiffEntry, Tuid};
    use tuid_storage::{InMemoryAnnotationStore, InMemoryFrontierStore};

    struct MemoryPersistence(AtomicU64);

    impl CounterPersistence for MemoryPersistence {
        fn load(&self) -> CoreResult<u64> {
            Ok(self.0.load(Ordering::SeqCst))
        }
        fn persist(&self, high_water_mark: u64) -> CoreResult<()> {
            self.0.store(high_water_mark, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedChangelog {
        steps: Vec<ChangelogStep>,
    }

    impl ChangelogOracle for FixedChangelog {
        fn range(&self, from: &RevisionId, to: &RevisionId) -> CoreResult<ChangelogRange> {
            let from_pos = self.steps.iter().position(|s| &s.revision == from);
            let to_pos = self.steps.iter().position(|s| &s.revision == to);
            match (from_pos, to_pos) {
                (Some(f), Some(t)) if f <= t => {
                    Ok(ChangelogRange::new(self.steps[f + 1..=t].to_vec()))
                }
                _ => Ok(ChangelogRange::default()),
            }
        }
        fn tip(&self, _branch: &str) -> CoreResult<RevisionId> {
            Ok(self.steps.last().unwrap().revision.clone())
        }
        fn phase(&self, _revision: &RevisionId) -> CoreResult<tuid_core::types::RevisionPhase> {
            Ok(tuid_core::types::RevisionPhase::Public)
        }
        fn pushes(&self, _changeset: &RevisionId) -> CoreResult<Vec<RevisionId>> {
            Ok(vec![])
        }
        fn exists_on_branch(&self, _branch: &str, revision: &RevisionId) -> CoreResult<bool> {
            Ok(self.steps.iter().any(|s| &s.revision == revision))
        }
        fn parents(&self, revision: &RevisionId) -> CoreResult<Vec<RevisionId>> {
            let pos = self.steps.iter().position(|s| &s.revision == revision);
            Ok(match pos {
                Some(0) | None => vec![],
                Some(p) => vec![self.steps[p - 1].revision.clone()],
            })
        }
    }

    struct FixedDiffs {
        diffs: HashMap<RevisionId, Diff>,
    }

    impl DiffOracle for FixedDiffs {
        fn diff(&self, revision: &RevisionId) -> CoreResult<Diff> {
            Ok(self.diffs.get(revision).cloned().unwrap_or(Diff {
                merge: false,
                files: vec![],
            }))
        }
    }

    #[test]
    fn forward_move_applies_intermediate_diffs_and_sets_frontier() {
        let r0 = RevisionId::new("r0");
        let r1 = RevisionId::new("r1");
        let changelog = Arc::new(FixedChangelog {
            steps: vec![
                ChangelogStep {
                    ordinal: 0,
                    revision: r0.clone(),
                },
                ChangelogStep {
                    ordinal: 1,
                    revision: r1.clone(),
                },
            ],
        });
        let mut diffs_map = HashMap::new();
        diffs_map.insert(
            r1.clone(),
            Diff {
                merge: false,
                files: vec![FileDiffEntry {
                    old_name: FileKey::new("a.txt"),
                    new_name: FileKey::new("a.txt"),
                    changes: vec![ChangeOp {
                        action: ChangeAction::Add,
                        line: 1,
                    }],
                }],
            },
        );
        let diffs = Arc::new(FixedDiffs { diffs: diffs_map });
        let store = Arc::new(InMemoryAnnotationStore::new());
        store.insert_if_absent(
            AnnotationKey::new(r0.clone(), FileKey::new("a.txt")),
            Annotation::from_tuids(vec![Tuid::new(1), Tuid::new(2), Tuid::new(3)]),
        );
        let frontiers = Arc::new(InMemoryFrontierStore::new());
        let allocator = Arc::new(TuidAllocator::new(MemoryPersistence(AtomicU64::new(10))).unwrap());

        let mover = FrontierMover::new(changelog, diffs, store, frontiers.clone(), allocator, 30);
        let results = mover.move_files(&[(FileKey::new("a.txt"), r0.clone())], &r1, false);
        match &results[0].1 {
            MoveOutcome::Moved(ann) => assert_eq!(ann.len(), 4),
            MoveOutcome::NeedsReannotation => panic!("expected a move"),
        }
        assert_eq!(frontiers.get_frontier(&FileKey::new("a.txt")).unwrap(), r1);
    }

    #[test]
    fn backward_move_keys_the_result_under_the_parent_revision() {
        let r0 = RevisionId::new("r0");
        let r1 = RevisionId::new("r1");
        let r2 = RevisionId::new("r2");
        let changelog = Arc::new(FixedChangelog {
            steps: vec![
                ChangelogStep {
                    ordinal: 0,
                    revision: r0.clone(),
                },
                ChangelogStep {
                    ordinal: 1,
                    revision: r1.clone(),
                },
                ChangelogStep {
                    ordinal: 2,
                    revision: r2.clone(),
                },
            ],
        });
        let mut diffs_map = HashMap::new();
        diffs_map.insert(
            r2.clone(),
            Diff {
                merge: false,
                files: vec![FileDiffEntry {
                    old_name: FileKey::new("a.txt"),
                    new_name: FileKey::new("a.txt"),
                    changes: vec![ChangeOp {
                        action: ChangeAction::Add,
                        line: 1,
                    }],
                }],
            },
        );
        let diffs = Arc::new(FixedDiffs { diffs: diffs_map });
        let store = Arc::new(InMemoryAnnotationStore::new());
        let t1 = Tuid::new(1);
        let t2 = Tuid::new(2);
        let t3 = Tuid::new(3);
        let t4 = Tuid::new(4);
        store.insert_if_absent(
            AnnotationKey::new(r2.clone(), FileKey::new("a.txt")),
            Annotation::from_tuids(vec![t1, t4, t2, t3]),
        );
        let frontiers = Arc::new(InMemoryFrontierStore::new());
        let allocator = Arc::new(TuidAllocator::new(MemoryPersistence(AtomicU64::new(10))).unwrap());

        let mover = FrontierMover::new(changelog, diffs, store.clone(), frontiers, allocator, 30);
        let results = mover.move_files(&[(FileKey::new("a.txt"), r2.clone())], &r1, false);
        match &results[0].1 {
            MoveOutcome::Moved(ann) => assert_eq!(ann.as_slice(), &[t1, t2, t3]),
            MoveOutcome::NeedsReannotation => panic!("expected a move"),
        }

        let r1_key = AnnotationKey::new(r1, FileKey::new("a.txt"));
        assert_eq!(store.get(&r1_key).unwrap().as_slice(), &[t1, t2, t3]);
        let r2_key = AnnotationKey::new(r2, FileKey::new("a.txt"));
        assert_eq!(store.get(&r2_key).unwrap().as_slice(), &[t1, t4, t2, t3]);
    }

    #[test]
    fn missing_source_annotation_requests_reannotation() {
        let r0 = RevisionId::new("r0");
        let r1 = RevisionId::new("r1");
        let changelog = Arc::new(FixedChangelog {
            steps: vec![
                ChangelogStep {
                    ordinal: 0,
                    revision: r0.clone(),
                },
                ChangelogStep {
                    ordinal: 1,
                    revision: r1.clone(),
                },
            ],
        });
        let diffs = Arc::new(FixedDiffs {
            diffs: HashMap::new(),
        });
        let store = Arc::new(InMemoryAnnotationStore::new());
        let frontiers = Arc::new(InMemoryFrontierStore::new());
        let allocator = Arc::new(TuidAllocator::new(MemoryPersistence(AtomicU64::new(0))).unwrap());

        let mover = FrontierMover::new(changelog, diffs, store, frontiers, allocator, 30);
        let results = mover.move_files(&[(FileKey::new("a.txt"), r0)], &r1, false);
        assert_eq!(results[0].1, MoveOutcome::NeedsReannotation);
    }
}

//! C8: resolution against ephemeral "try" pushes.
//!
//! Try history is rewritten on every push, so frontiers are never
//! maintained for it (spec §4.8). Instead: find the push containing the
//! requested revision, resolve the requested files at its public ancestor
//! via the standard path, then replay just that push's draft diffs.
//! Grounded on the original's `_get_push`/`_make_diffs_for_push` pairing.

use crate::acquirer::{Acquired, AnnotationAcquirer};
use crate::coordinator::{ResolveOptions, TuidService};
use crate::diff_applier::apply_forward;
use std::collections::HashMap;
use std::sync::Arc;
use tuid_concurrency::TuidAllocator;
use tuid_core::error::{Error, Result};
use tuid_core::traits::{AnnotationStore, ChangelogOracle, CounterPersistence, DiffOracle};
use tuid_core::types::{Annotation, AnnotationKey, Diff, FileKey, RevisionId, Tuid};

/// C8's push-replay resolver.
pub struct TryBranchResolver<P: CounterPersistence> {
    changelog: Arc<dyn ChangelogOracle>,
    diffs: Arc<dyn DiffOracle>,
    store: Arc<dyn AnnotationStore>,
    allocator: Arc<TuidAllocator<P>>,
    acquirer: Arc<AnnotationAcquirer<P>>,
    service: Arc<TuidService<P>>,
    default_branch: String,
}

#[derive(Clone, Copy)]
enum Disposition {
    Added,
    Removed,
    Touched,
    Untouched,
}

impl<P: CounterPersistence + 'static> TryBranchResolver<P> {
    /// Build a resolver over the given collaborators. `service` is used
    /// only to resolve files at the push's public ancestor, which is a
    /// standard (non-try) resolution.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        changelog: Arc<dyn ChangelogOracle>,
        diffs: Arc<dyn DiffOracle>,
        store: Arc<dyn AnnotationStore>,
        allocator: Arc<TuidAllocator<P>>,
        acquirer: Arc<AnnotationAcquirer<P>>,
        service: Arc<TuidService<P>>,
        default_branch: impl Into<String>,
    ) -> Self {
        TryBranchResolver {
            changelog,
            diffs,
            store,
            allocator,
            acquirer,
            service,
            default_branch: default_branch.into(),
        }
    }

    /// Resolve `files` at `revision`, a changeset on an ephemeral push.
    pub fn resolve(
        &self,
        files: &[FileKey],
        revision: &RevisionId,
    ) -> Result<Vec<(FileKey, Vec<Tuid>)>> {
        let push = self.changelog.pushes(revision)?;
        if push.is_empty() {
            return Err(Error::ChangelogFailure {
                from: revision.to_string(),
                to: revision.to_string(),
            });
        }

        let parents = self.changelog.parents(&push[0])?;
        if parents.len() != 1 {
            return Err(Error::ChangelogFailure {
                from: push[0].to_string(),
                to: revision.to_string(),
            });
        }
        let ancestor = parents.into_iter().next().expect("checked len == 1");

        let (ancestor_pairs, _) = self.service.resolve(
            files,
            &ancestor,
            ResolveOptions {
                repo: Some(self.default_branch.clone()),
                use_thread: false,
                ..ResolveOptions::default()
            },
        );
        let ancestor_annotations: HashMap<FileKey, Annotation> = ancestor_pairs
            .into_iter()
            .map(|(file, tuids)| (file, Annotation::from_tuids(tuids)))
            .collect();

        let mut diff_cache: HashMap<RevisionId, Diff> = HashMap::new();
        for push_revision in &push {
            if diff_cache.contains_key(push_revision) {
                continue;
            }
            diff_cache.insert(push_revision.clone(), self.diffs.diff(push_revision)?);
        }

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let ancestor_annotation = ancestor_annotations
                .get(file)
                .cloned()
                .unwrap_or_else(Annotation::tombstone);
            let outcome =
                self.resolve_one(file, &ancestor_annotation, &push, &diff_cache, revision)?;
            results.push((file.clone(), outcome));
        }
        Ok(results)
    }

    /// Determine how `file` evolves across `push`'s draft diffs, tracking
    /// renames as it goes.
    fn classify(
        &self,
        file: &FileKey,
        push: &[RevisionId],
        diff_cache: &HashMap<RevisionId, Diff>,
    ) -> (Disposition, FileKey) {
        let mut current_name = file.clone();
        let mut disposition = Disposition::Untouched;
        for push_revision in push {
            let diff = diff_cache.get(push_revision).expect("fetched above");
            let entry = match diff.entry_for(&current_name) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.old_name.is_dev_null() {
                disposition = Disposition::Added;
            } else if entry.new_name.is_dev_null() {
                disposition = Disposition::Removed;
            } else if matches!(disposition, Disposition::Untouched) {
                disposition = Disposition::Touched;
            }
            current_name = if entry.old_name != entry.new_name {
                entry.new_name.clone()
            } else {
                current_name
            };
        }
        (disposition, current_name)
    }

    fn resolve_one(
        &self,
        file: &FileKey,
        ancestor_annotation: &Annotation,
        push: &[RevisionId],
        diff_cache: &HashMap<RevisionId, Diff>,
        revision: &RevisionId,
    ) -> Result<Vec<Tuid>> {
        let key = AnnotationKey::new(revision.clone(), file.clone());
        if let Some(existing) = self.store.get(&key) {
            return Ok(existing.into_vec());
        }

        let (disposition, _final_name) = self.classify(file, push, diff_cache);

        match disposition {
            Disposition::Added => match self.acquirer.acquire(file, revision)? {
                Acquired::Annotation(ann) => Ok(ann.into_vec()),
                Acquired::Tombstone | Acquired::TimedOut => Ok(Vec::new()),
            },
            Disposition::Removed => {
                let tombstone = Annotation::tombstone();
                self.store.insert_if_absent(key.clone(), tombstone);
                Ok(Vec::new())
            }
            Disposition::Touched => {
                let mut current_name = file.clone();
                let mut annotation = ancestor_annotation.clone();
                for push_revision in push {
                    let diff = diff_cache.get(push_revision).expect("fetched above");
                    let (next_annotation, next_name) =
                        apply_forward(&annotation, diff, &current_name, &self.allocator)?;
                    annotation = next_annotation;
                    current_name = next_name;
                }
                if self.store.insert_if_absent(key.clone(), annotation.clone()) {
                    Ok(annotation.into_vec())
                } else {
                    Ok(self
                        .store
                        .get(&key)
                        .expect("insert_if_absent lost the race, so a value must be present")
                        .into_vec())
                }
            }
            Disposition::Untouched => {
                if self
                    .store
                    .insert_if_absent(key.clone(), ancestor_annotation.clone())
                {
                    Ok(ancestor_annotation.clone().into_vec())
                } else {
                    Ok(self
                        .store
                        .get(&key)
                        .expect("insert_if_absent lost the race, so a value must be present")
                        .into_vec())
                }
            }
        }
    }
}

//! C7: the engine's public entry point, `resolve(files, revision, opts)`.
//!
//! Grounded on `get_tuids_from_files` in the original service: classify
//! every file as cached/movable/new, dispatch movable work to the Frontier
//! Mover (C6) and new work to the Annotation Acquirer (C5), and — above
//! `files_to_process_thresh` — hand the whole batch to a background worker
//! instead of blocking the caller.

use crate::acquirer::{Acquired, AnnotationAcquirer};
use crate::frontier_mover::{FrontierMover, MoveOutcome};
use crate::stats::Stats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tuid_concurrency::{CachingGate, TtlCache, WorkerPool};
use tuid_core::config::Config;
use tuid_core::error::Result;
use tuid_core::traits::{AnnotationStore, ChangelogOracle, CounterPersistence, FileListOracle, FrontierStore};
use tuid_core::types::{FileKey, RevisionId, Tuid};

/// Per-call overrides for `resolve` (spec §4.7).
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Force every requested file's frontier to `revision` even when the
    /// walk could not fully complete (used by the Prefetch Daemon, C9).
    pub going_forward: bool,
    /// Branch to resolve against. `None` triggers the branch guard.
    pub repo: Option<String>,
    /// Whether overflow work may be dispatched to a background worker.
    pub use_thread: bool,
    /// Override for `Config::max_csets_proc` on this call.
    pub max_csets_proc: Option<usize>,
    /// Whether this call originates from automated/ETL traffic (pauses the
    /// prefetch daemon when `false`... see [`CachingGate`]).
    pub etl: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            going_forward: false,
            repo: None,
            use_thread: true,
            max_csets_proc: None,
            etl: true,
        }
    }
}

enum Classified {
    Cached(Vec<Tuid>),
    Movable(RevisionId),
    New,
}

/// The resolution engine's public facade.
pub struct TuidService<P: CounterPersistence> {
    store: Arc<dyn AnnotationStore>,
    frontiers: Arc<dyn FrontierStore>,
    changelog: Arc<dyn ChangelogOracle>,
    files: Arc<dyn FileListOracle>,
    acquirer: Arc<AnnotationAcquirer<P>>,
    mover: Arc<FrontierMover<P>>,
    worker_pool: Arc<WorkerPool>,
    branch_cache: Arc<TtlCache<(String, RevisionId), bool>>,
    caching_gate: Arc<CachingGate>,
    stats: Arc<Stats>,
    config: Config,
}

impl<P: CounterPersistence + 'static> TuidService<P> {
    /// Assemble a service from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        frontiers: Arc<dyn FrontierStore>,
        changelog: Arc<dyn ChangelogOracle>,
        files: Arc<dyn FileListOracle>,
        acquirer: Arc<AnnotationAcquirer<P>>,
        mover: Arc<FrontierMover<P>>,
        worker_pool: Arc<WorkerPool>,
        caching_gate: Arc<CachingGate>,
        config: Config,
    ) -> Self {
        TuidService {
            store,
            frontiers,
            changelog,
            files,
            acquirer,
            mover,
            worker_pool,
            branch_cache: Arc::new(TtlCache::new(Duration::from_secs(30 * 60))),
            caching_gate,
            stats: Arc::new(Stats::new()),
            config,
        }
    }

    /// `resolve_revision(revision) → [(file, [TUID])]` (spec §6): resolve
    /// every file `json-info` reports for `revision`, rather than a caller-
    /// supplied file list.
    pub fn resolve_revision(
        self: &Arc<Self>,
        revision: &RevisionId,
    ) -> Result<(Vec<(FileKey, Vec<Tuid>)>, bool)> {
        let files = self.files.files_at(revision)?;
        Ok(self.resolve(&files, revision, ResolveOptions::default()))
    }

    /// Resolve TUIDs for `files` at `revision` (spec §4.7).
    pub fn resolve(
        self: &Arc<Self>,
        files: &[FileKey],
        revision: &RevisionId,
        opts: ResolveOptions,
    ) -> (Vec<(FileKey, Vec<Tuid>)>, bool) {
        if !opts.etl {
            self.caching_gate.pause();
        }
        // Re-opened once this call's own work is done — inline below, or by
        // `dispatch_overflow` once every batch it submitted has actually run.
        let reopen_gate = !opts.etl;

        if let Some(repo) = &opts.repo {
            if repo != &self.config.hg.branch && !self.config.enable_try {
                if reopen_gate {
                    self.caching_gate.go();
                }
                return (files.iter().map(|f| (f.clone(), Vec::new())).collect(), true);
            }
        } else if !self.branch_guard_passes(revision) {
            if reopen_gate {
                self.caching_gate.go();
            }
            return (files.iter().map(|f| (f.clone(), Vec::new())).collect(), true);
        }

        let mut cached = Vec::new();
        let mut movable = Vec::new();
        let mut new_files = Vec::new();

        for file in files {
            match self.classify(file, revision) {
                Classified::Cached(tuids) => cached.push((file.clone(), tuids)),
                Classified::Movable(frontier) => movable.push((file.clone(), frontier)),
                Classified::New => new_files.push(file.clone()),
            }
        }

        let total_work = movable.len() + new_files.len();
        if total_work == 0 {
            self.stats.record_resolve(cached.len(), 0, 0, 0);
            if reopen_gate {
                self.caching_gate.go();
            }
            return (cached, true);
        }

        if total_work > self.config.files_to_process_thresh && opts.use_thread {
            self.dispatch_overflow(movable, new_files, revision.clone(), opts);
            self.stats.record_resolve(cached.len(), 0, 0, 0);
            return (cached, false);
        }

        let mut results = self.process_batch(&movable, &new_files, revision, &opts);
        results.extend(cached);
        if reopen_gate {
            self.caching_gate.go();
        }
        (results, true)
    }

    fn branch_guard_passes(&self, revision: &RevisionId) -> bool {
        let key = (self.config.hg.branch.clone(), revision.clone());
        if let Some(cached) = self.branch_cache.get(&key) {
            return cached;
        }
        let exists = self
            .changelog
            .exists_on_branch(&self.config.hg.branch, revision)
            .unwrap_or(false);
        self.branch_cache.insert(key, exists);
        exists
    }

    fn classify(&self, file: &FileKey, revision: &RevisionId) -> Classified {
        let key = tuid_core::types::AnnotationKey::new(revision.clone(), file.clone());
        if let Some(annotation) = self.store.get(&key) {
            if self.should_advance_frontier(file, revision) {
                self.frontiers.set_frontier(file.clone(), revision.clone());
            }
            return Classified::Cached(annotation.into_vec());
        }

        match self.frontiers.get_frontier(file) {
            Some(frontier) if &frontier != revision => Classified::Movable(frontier),
            Some(_) => Classified::New,
            None => Classified::New,
        }
    }

    fn should_advance_frontier(&self, file: &FileKey, revision: &RevisionId) -> bool {
        match self.frontiers.get_frontier(file) {
            None => true,
            Some(current) if &current == revision => false,
            Some(current) => self
                .changelog
                .range(&current, revision)
                .map(|r| !r.is_empty())
                .unwrap_or(false),
        }
    }

    fn process_batch(
        &self,
        movable: &[(FileKey, RevisionId)],
        new_files: &[FileKey],
        revision: &RevisionId,
        opts: &ResolveOptions,
    ) -> Vec<(FileKey, Vec<Tuid>)> {
        let mut results = Vec::with_capacity(movable.len() + new_files.len());
        let mover = match opts.max_csets_proc {
            Some(max) => self.mover.with_max_csets_proc(max),
            None => self.mover.with_max_csets_proc(self.config.max_csets_proc),
        };
        let mut moved_count = 0;
        let mut timed_out_count = 0;
        for (file, outcome) in mover.move_files(movable, revision, opts.going_forward) {
            match outcome {
                MoveOutcome::Moved(annotation) => {
                    moved_count += 1;
                    results.push((file, annotation.into_vec()));
                }
                MoveOutcome::NeedsReannotation => {
                    match self.acquirer.acquire(&file, revision) {
                        Ok(Acquired::Annotation(ann)) => {
                            self.frontiers.set_frontier(file.clone(), revision.clone());
                            results.push((file, ann.into_vec()));
                        }
                        Ok(Acquired::Tombstone) => results.push((file, Vec::new())),
                        Ok(Acquired::TimedOut) => {
                            timed_out_count += 1;
                            results.push((file, Vec::new()));
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "acquisition failed after failed move");
                            results.push((file, Vec::new()));
                        }
                    }
                }
            }
        }

        let mut acquired_count = 0;
        for file in new_files {
            match self.acquirer.acquire(file, revision) {
                Ok(Acquired::Annotation(ann)) => {
                    acquired_count += 1;
                    self.frontiers.set_frontier(file.clone(), revision.clone());
                    results.push((file.clone(), ann.into_vec()));
                }
                Ok(Acquired::Tombstone) => results.push((file.clone(), Vec::new())),
                Ok(Acquired::TimedOut) => {
                    timed_out_count += 1;
                    results.push((file.clone(), Vec::new()));
                }
                Err(err) => {
                    tracing::warn!(file = %file, error = %err, "acquisition failed");
                    results.push((file.clone(), Vec::new()));
                }
            }
        }

        self.stats.record_resolve(0, acquired_count, moved_count, timed_out_count);
        results
    }

    fn dispatch_overflow(
        self: &Arc<Self>,
        movable: Vec<(FileKey, RevisionId)>,
        new_files: Vec<FileKey>,
        revision: RevisionId,
        opts: ResolveOptions,
    ) {
        let batch_size = self.config.work_overflow_batch_size.max(1);
        let movable_chunks: Vec<Vec<(FileKey, RevisionId)>> =
            movable.chunks(batch_size).map(|c| c.to_vec()).collect();
        let new_chunks: Vec<Vec<FileKey>> = new_files.chunks(batch_size).map(|c| c.to_vec()).collect();
        let reopen_gate = !opts.etl;

        // Tracks how many dispatched batches are still running; the gate
        // re-opens once this reaches zero, not merely once every batch is
        // submitted (spec §4.9).
        let pending = Arc::new(AtomicUsize::new(movable_chunks.len() + new_chunks.len()));
        if pending.load(Ordering::SeqCst) == 0 {
            if reopen_gate {
                self.caching_gate.go();
            }
            return;
        }

        for chunk in movable_chunks {
            let service = Arc::clone(self);
            let revision = revision.clone();
            let opts = opts.clone();
            let pending_for_task = Arc::clone(&pending);
            let submitted = service.worker_pool.submit(move || {
                let _ = service.process_batch(&chunk, &[], &revision, &opts);
                if pending_for_task.fetch_sub(1, Ordering::SeqCst) == 1 && reopen_gate {
                    service.caching_gate.go();
                }
            });
            if submitted.is_err() {
                tracing::warn!("overflow worker pool full, movable batch dropped this round");
                if pending.fetch_sub(1, Ordering::SeqCst) == 1 && reopen_gate {
                    self.caching_gate.go();
                }
            }
        }
        for chunk in new_chunks {
            let service = Arc::clone(self);
            let revision = revision.clone();
            let opts = opts.clone();
            let pending_for_task = Arc::clone(&pending);
            let submitted = service.worker_pool.submit(move || {
                let _ = service.process_batch(&[], &chunk, &revision, &opts);
                if pending_for_task.fetch_sub(1, Ordering::SeqCst) == 1 && reopen_gate {
                    service.caching_gate.go();
                }
            });
            if submitted.is_err() {
                tracing::warn!("overflow worker pool full, new-file batch dropped this round");
                if pending.fetch_sub(1, Ordering::SeqCst) == 1 && reopen_gate {
                    self.caching_gate.go();
                }
            }
        }
    }
}

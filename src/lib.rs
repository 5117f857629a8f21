//! Facade crate: wires the `tuid-*` workspace members into one running
//! resolution engine.
//!
//! This crate owns no algorithms of its own — everything lives in
//! `tuid-core` (types/traits/config), `tuid-storage` (in-memory stores),
//! `tuid-durability` (counter persistence), `tuid-concurrency` (allocator
//! and scheduling primitives), `tuid-upstream` (HTTP oracle client) and
//! `tuid-engine` (C4-C9). `build_service` is the one function most callers
//! need: point it at a [`Config`] and get back a ready-to-call
//! [`TuidService`].

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tuid_concurrency::{AnnotateSemaphore, CachingGate, TuidAllocator, WorkerPool};
pub use tuid_core::config::Config;
use tuid_core::error::{Error, Result};
use tuid_core::traits::{AllRevisionsCoverageIndex, CoverageIndex};
pub use tuid_core::types::{Annotation, FileKey, RevisionId, Tuid};
use tuid_durability::FileCounterStore;
pub use tuid_engine::{PrefetchDaemon, ResolveOptions, TryBranchResolver, TuidService};
use tuid_storage::{InMemoryAnnotationStore, InMemoryFrontierStore};
use tuid_upstream::HgUpstreamClient;
use url::Url;

/// Concrete counter persistence this facade wires in. Kept as a type alias
/// so callers that need `TuidService<CounterStore>` in a signature don't
/// have to name `tuid_durability::FileCounterStore` themselves.
pub type CounterStore = FileCounterStore;

/// Everything [`build_service`] assembled, bundled for a binary's `main`.
pub struct Engine {
    /// The request coordinator (C7), the engine's main entry point.
    pub service: Arc<TuidService<CounterStore>>,
    /// The try-branch resolver (C8), for requests against ephemeral pushes.
    pub try_branch: Arc<TryBranchResolver<CounterStore>>,
    /// The prefetch daemon (C9), not yet started.
    pub daemon: PrefetchDaemon<CounterStore>,
    /// The loaded configuration.
    pub config: Config,
}

/// Assemble an [`Engine`] from `config`, rooted at `state_dir` for the
/// counter file (spec §6's "temporal counter table").
pub fn build_service(config: Config, state_dir: impl Into<PathBuf>) -> Result<Engine> {
    let state_dir = state_dir.into();
    let counter_path = state_dir.join(format!("{}.counter", config.database.name));
    let persistence = FileCounterStore::new(counter_path);
    let allocator = Arc::new(TuidAllocator::new(persistence)?);

    let store = Arc::new(InMemoryAnnotationStore::new());
    let frontiers = Arc::new(InMemoryFrontierStore::new());

    let base_url = Url::parse(&config.hg.url)
        .map_err(|e| Error::Fatal(format!("invalid hg.url {:?}: {e}", config.hg.url)))?;
    let upstream = Arc::new(HgUpstreamClient::new(base_url, config.hg.branch.clone()));

    let semaphore = Arc::new(AnnotateSemaphore::new(config.max_concurrent_ann_requests));
    let acquirer = Arc::new(tuid_engine::AnnotationAcquirer::new(
        upstream.clone(),
        allocator.clone(),
        store.clone(),
        semaphore,
        config.ann_wait,
    ));
    let mover = Arc::new(tuid_engine::FrontierMover::new(
        upstream.clone(),
        upstream.clone(),
        store.clone(),
        frontiers.clone(),
        allocator.clone(),
        config.max_csets_proc,
    ));

    let worker_pool = Arc::new(WorkerPool::new(
        config.max_concurrent_ann_requests.max(1),
        config.work_overflow_batch_size.max(1) * 4,
    ));
    let caching_gate = Arc::new(CachingGate::new());

    let service = Arc::new(TuidService::new(
        store.clone(),
        frontiers.clone(),
        upstream.clone(),
        upstream.clone(),
        acquirer.clone(),
        mover,
        worker_pool,
        caching_gate.clone(),
        config.clone(),
    ));

    let try_branch = Arc::new(TryBranchResolver::new(
        upstream.clone(),
        upstream.clone(),
        store,
        allocator,
        acquirer,
        service.clone(),
        config.hg.branch.clone(),
    ));

    let coverage: Arc<dyn CoverageIndex> = Arc::new(AllRevisionsCoverageIndex);
    let daemon = PrefetchDaemon::new(
        frontiers,
        upstream,
        coverage,
        service.clone(),
        caching_gate,
        config.clone(),
    );

    Ok(Engine {
        service,
        try_branch,
        daemon,
        config,
    })
}

/// How long the daemon's internal wait-for-new-revisions loop checks in
/// between iterations when idle, re-exported for binaries that want to
/// size their own shutdown polling the same way.
pub const DAEMON_IDLE_POLL: Duration = Duration::from_secs(1);

//! C9: background thread that keeps tracked files' frontiers moving toward
//! the branch tip without being asked.
//!
//! Grounded on the original's changelog-following background loop: group
//! tracked files by their current frontier, walk each group forward, and
//! push every surviving revision through the Request Coordinator with
//! `going_forward=true` so a bounded walk still advances the frontier even
//! when it can't fully resolve (spec §4.9).

use crate::coordinator::{ResolveOptions, TuidService};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tuid_concurrency::CachingGate;
use tuid_core::config::Config;
use tuid_core::traits::{ChangelogOracle, CounterPersistence, CoverageIndex, FrontierStore};
use tuid_core::types::{FileKey, RevisionId};

/// The prefetch daemon's single background loop.
pub struct PrefetchDaemon<P: CounterPersistence> {
    frontiers: Arc<dyn FrontierStore>,
    changelog: Arc<dyn ChangelogOracle>,
    coverage: Arc<dyn CoverageIndex>,
    service: Arc<TuidService<P>>,
    caching_gate: Arc<CachingGate>,
    config: Config,
    stop: Arc<AtomicBool>,
}

impl<P: CounterPersistence + 'static> PrefetchDaemon<P> {
    /// Build a daemon over the given collaborators.
    pub fn new(
        frontiers: Arc<dyn FrontierStore>,
        changelog: Arc<dyn ChangelogOracle>,
        coverage: Arc<dyn CoverageIndex>,
        service: Arc<TuidService<P>>,
        caching_gate: Arc<CachingGate>,
        config: Config,
    ) -> Self {
        PrefetchDaemon {
            frontiers,
            changelog,
            coverage,
            service,
            caching_gate,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shared flag that, once set, stops the loop at its next check
    /// point (spec §5: "a global stop signal propagates to all waits").
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run the loop until [`Self::stop_flag`] is set. Intended to be the
    /// body of a dedicated thread (see [`tuid_concurrency::WorkerPool`]'s
    /// doc comment on the daemon using it as its single long-running
    /// task).
    pub fn run(&self) {
        while !self.stop.load(Ordering::Acquire) {
            self.caching_gate.wait_until_go();
            if self.stop.load(Ordering::Acquire) {
                return;
            }
            let advanced = self.tick();
            if !advanced {
                std::thread::sleep(self.config.daemon_wait_at_newest);
            }
        }
    }

    /// One iteration: advance every group that has unseen revisions.
    /// Returns `true` iff at least one group advanced.
    fn tick(&self) -> bool {
        let groups = self.group_by_frontier();
        let mut advanced = false;

        for (frontier, files) in groups {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let tip = match self.changelog.tip(&self.config.hg.branch) {
                Ok(tip) => tip,
                Err(err) => {
                    tracing::warn!(error = %err, "prefetch daemon failed to read branch tip");
                    continue;
                }
            };
            if tip == frontier {
                continue;
            }
            let range = match self.changelog.range(&frontier, &tip) {
                Ok(range) => range,
                Err(err) => {
                    tracing::warn!(error = %err, frontier = %frontier, "prefetch daemon failed to walk changelog");
                    continue;
                }
            };

            let revisions: Vec<RevisionId> = range
                .revisions()
                .filter(|r| !self.config.only_coverage_revisions || self.coverage.covers(r))
                .cloned()
                .collect();

            for revision in revisions {
                if self.stop.load(Ordering::Acquire) {
                    break;
                }
                let (_, _completed) = self.service.resolve(
                    &files,
                    &revision,
                    ResolveOptions {
                        going_forward: true,
                        use_thread: false,
                        etl: false,
                        ..ResolveOptions::default()
                    },
                );
                advanced = true;
            }
        }

        advanced
    }

    fn group_by_frontier(&self) -> HashMap<RevisionId, Vec<FileKey>> {
        let mut groups: HashMap<RevisionId, Vec<FileKey>> = HashMap::new();
        for (file, frontier) in self.frontiers.all() {
            groups.entry(frontier).or_default().push(file);
        }
        groups
    }
}

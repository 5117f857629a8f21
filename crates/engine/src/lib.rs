//! TUID resolution algorithms: C4 through C9.
//!
//! Lower layers (`tuid-storage`, `tuid-concurrency`, `tuid-durability`,
//! `tuid-upstream`) provide the seams this crate wires together; nothing
//! here talks to a store or an upstream endpoint except through the traits
//! in `tuid-core`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod acquirer;
pub mod coordinator;
pub mod daemon;
pub mod diff_applier;
pub mod frontier_mover;
pub mod stats;
pub mod try_branch;

pub use acquirer::{Acquired, AnnotationAcquirer};
pub use coordinator::{ResolveOptions, TuidService};
pub use daemon::PrefetchDaemon;
pub use frontier_mover::{FrontierMover, MoveOutcome};
pub use stats::Stats;
pub use try_branch::TryBranchResolver;

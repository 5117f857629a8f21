//! HTTP implementations of the Changelog/Diff/Raw-File oracle traits
//! (spec §6), plus the shared retry helper upstream calls share.
//!
//! No teacher crate in this workspace talks to a network at all — strata is
//! an embedded database — so this crate's shape follows the spec's endpoint
//! contract directly, using `reqwest`'s blocking client to match the
//! thread-per-worker model the rest of the engine uses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod retry;

pub use client::HgUpstreamClient;
pub use retry::RetryPolicy;

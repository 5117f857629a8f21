//! Domain types, oracle traits and the unified error/config surface for the
//! TUID resolution engine.
//!
//! This crate defines the foundational types used throughout the system:
//! - `Tuid`, `RevisionId`, `FileKey`: the identity primitives
//! - `Annotation`, `Diff`, `ChangelogRange`: the data model from spec §3
//! - `traits`: storage and upstream-oracle interfaces injected at
//!   construction time, so the concrete SQLite/HTTP implementations never
//!   leak into the resolution algorithms
//! - `Error`/`Result`: the unified error hierarchy
//! - `Config`: the single record naming every recognized option

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    Annotation, AnnotationKey, ChangeAction, ChangeOp, ChangelogRange, ChangelogStep, Diff,
    FileDiffEntry, FileKey, RevisionId, RevisionPhase, Tuid,
};

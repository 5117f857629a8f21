//! Unified error hierarchy for the TUID resolution engine (spec §7).

use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode the resolution engine surfaces.
///
/// Variants are grouped by how a caller should react: [`Error::is_retryable`]
/// marks transient upstream failures worth a bounded retry;
/// [`Error::is_fatal`] marks failures that should abort a background worker
/// rather than be swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// The Mercurial web endpoints returned a transient failure (timeout,
    /// connection reset, 5xx). Retried up to the configured retry count
    /// before being surfaced.
    #[error("upstream request to {endpoint} failed transiently: {source}")]
    UpstreamTransient {
        /// The endpoint that failed (`json-log`, `json-pushes`, ...).
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The upstream reported the requested revision or file does not exist.
    #[error("upstream has no record of {what}")]
    UpstreamNotFound {
        /// Human-readable description of what was missing.
        what: String,
    },

    /// A diff could not be applied to an annotation because the two
    /// disagreed on line count or referenced an out-of-range line (spec
    /// §4.4 edge cases).
    #[error("diff inconsistent with annotation: {reason}")]
    DiffInconsistency {
        /// Description of the mismatch.
        reason: String,
    },

    /// An annotation read back from storage violated invariant I1 (length
    /// mismatch) or contained a [`crate::Tuid::MISSING`] in a non-tombstone
    /// position.
    #[error("corrupt annotation for {revision}:{file}: {reason}")]
    CorruptAnnotation {
        /// Revision the annotation was stored under.
        revision: String,
        /// File the annotation was stored under.
        file: String,
        /// Description of the corruption.
        reason: String,
    },

    /// The Changelog Oracle could not produce a connecting range between
    /// two revisions (spec §4.6 edge case: "no path found").
    #[error("no changelog path from {from} to {to}")]
    ChangelogFailure {
        /// Starting revision.
        from: String,
        /// Target revision.
        to: String,
    },

    /// A non-retryable failure that should stop the calling worker:
    /// durability write failure, poisoned lock, config error.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// True for failures worth retrying with backoff (spec §6: "retry
    /// policy 3x5s" on upstream calls).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UpstreamTransient { .. })
    }

    /// True for failures that should abort the calling worker rather than
    /// be logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// Build a transient-upstream error.
    pub fn upstream_transient(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::UpstreamTransient {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn transient_upstream_errors_are_retryable() {
        let err = Error::upstream_transient("json-log", io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_errors_are_not_retryable() {
        let err = Error::Fatal("counter file unwritable".into());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_found_is_neither_retryable_nor_fatal() {
        let err = Error::UpstreamNotFound {
            what: "revision deadbeefcafe".into(),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }
}

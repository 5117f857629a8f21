//! Shared retry helper for upstream calls (spec §6: "3 attempts, 5-second
//! base sleep, on any transport error or 5xx").

use std::thread::sleep;
use std::time::Duration;
use tuid_core::error::Error;

/// Retry count and base sleep, matching the original's `RETRY = {times: 3,
/// sleep: 5}`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Sleep between attempts.
    pub base_sleep: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_sleep: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying while it returns a [`tuid_core::Error::is_retryable`]
    /// error, up to `self.attempts` total tries.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, Error>) -> Result<T, Error> {
        let mut last_err = None;
        for attempt in 0..self.attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.attempts => {
                    tracing::warn!(attempt, "upstream call failed transiently, retrying");
                    sleep(self.base_sleep);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io;

    #[test]
    fn succeeds_without_retry() {
        let policy = RetryPolicy {
            attempts: 3,
            base_sleep: Duration::from_millis(1),
        };
        let result = policy.run(|| Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn retries_transient_errors_until_exhausted() {
        let policy = RetryPolicy {
            attempts: 3,
            base_sleep: Duration::from_millis(1),
        };
        let calls = Cell::new(0);
        let result: Result<(), Error> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(Error::upstream_transient(
                "json-log",
                io::Error::new(io::ErrorKind::TimedOut, "timeout"),
            ))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn does_not_retry_non_retryable_errors() {
        let policy = RetryPolicy::default();
        let calls = Cell::new(0);
        let result: Result<(), Error> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(Error::UpstreamNotFound {
                what: "revision".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}

//! Prefetch/live-traffic arbitration gate (C9).
//!
//! The original service pauses its background changelog-following daemon
//! the moment a real resolve request comes in, and only resumes it when
//! explicitly told to start caching again. `CachingGate` is that on/off
//! switch: the Prefetch Daemon blocks on [`CachingGate::wait_until_go`]
//! between iterations, and the Request Coordinator calls [`CachingGate::pause`]
//! at the top of every live `resolve` call.

use parking_lot::{Condvar, Mutex};

/// Shared pause/resume signal between live requests and the prefetch daemon.
#[derive(Default)]
pub struct CachingGate {
    go: Mutex<bool>,
    changed: Condvar,
}

impl CachingGate {
    /// A gate that starts paused, matching the original's default
    /// (background caching is opt-in via an explicit `start` call).
    pub fn new() -> Self {
        CachingGate {
            go: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    /// Allow the daemon to run.
    pub fn go(&self) {
        let mut go = self.go.lock();
        if !*go {
            *go = true;
            self.changed.notify_all();
        }
    }

    /// Pause the daemon. Called on every live resolve request so prefetch
    /// never competes with user-facing traffic.
    pub fn pause(&self) {
        let mut go = self.go.lock();
        if *go {
            *go = false;
        }
    }

    /// True iff the gate currently allows running.
    pub fn is_go(&self) -> bool {
        *self.go.lock()
    }

    /// Block until the gate is opened. Used by the daemon's loop between
    /// iterations so it doesn't spin while paused.
    pub fn wait_until_go(&self) {
        let mut go = self.go.lock();
        while !*go {
            self.changed.wait(&mut go);
        }
    }
}

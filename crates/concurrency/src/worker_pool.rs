//! FIFO background worker pool.
//!
//! Stripped-down cousin of the teacher's priority scheduler: the TUID
//! engine has no equivalent of GC-vs-flush priority tiers, so this pool
//! keeps the bounded queue, drain and shutdown discipline but drops the
//! `BinaryHeap`/priority machinery in favor of a plain `VecDeque`.
//!
//! Used by the Request Coordinator (C7) to dispatch overflow work above
//! `files_to_process_thresh`, and by the Prefetch Daemon (C9) as its single
//! long-running loop thread.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Error returned when the task queue is full or the pool is shutting down.
#[derive(Debug)]
pub struct BackpressureError;

impl std::fmt::Display for BackpressureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker pool queue is full or shutting down")
    }
}

impl std::error::Error for BackpressureError {}

/// Pool metrics snapshot.
pub struct PoolStats {
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Tasks currently executing.
    pub active_tasks: usize,
    /// Total tasks completed since pool creation.
    pub tasks_completed: u64,
}

struct PoolInner {
    queue: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
}

/// A fixed pool of worker threads draining a FIFO task queue.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `num_threads` workers named `tuid-worker-0`, `tuid-worker-1`, ...
    pub fn new(num_threads: usize, max_queue_depth: usize) -> Self {
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth,
            tasks_completed: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("tuid-worker-{i}"))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn worker pool thread");
            workers.push(handle);
        }

        WorkerPool {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Submit a task. Returns `Err` if the queue is at capacity or the pool
    /// has been shut down.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<(), BackpressureError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BackpressureError);
        }
        if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
            return Err(BackpressureError);
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Box::new(work));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight tasks have completed. Workers
    /// remain running after this returns.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit and join all threads. Workers finish their
    /// current task and drain the remaining queue before exiting.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Snapshot of pool metrics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
        }
    }
}

struct ActiveTaskGuard<'a> {
    inner: &'a PoolInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;

    #[test]
    fn submitted_tasks_run() {
        let pool = WorkerPool::new(2, 16);
        let counter = Arc::new(Counter::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        pool.shutdown();
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1, 4);
        pool.shutdown();
        assert!(pool.submit(|| {}).is_err());
    }
}

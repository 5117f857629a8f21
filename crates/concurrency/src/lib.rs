//! Concurrency primitives shared across the resolution engine: the TUID
//! allocator, the annotate-request gate, the prefetch/live arbitration
//! signal, a generic TTL cache, and a FIFO background worker pool.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod caching_gate;
pub mod semaphore;
pub mod ttl_cache;
pub mod worker_pool;

pub use allocator::TuidAllocator;
pub use caching_gate::CachingGate;
pub use semaphore::{AnnotatePermit, AnnotateSemaphore};
pub use ttl_cache::TtlCache;
pub use worker_pool::{BackpressureError, PoolStats, WorkerPool};

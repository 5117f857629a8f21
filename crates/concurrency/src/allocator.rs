//! Monotonic TUID allocation (C1).
//!
//! A single in-memory `AtomicU64` hands out values lock-free; durability is
//! maintained by reserving a block of the counter space at a time and
//! persisting the new high-water mark before any value in the block is
//! handed out. A crash can waste the unused tail of a reserved block, but
//! I6 (no TUID reused) holds, because nothing below the persisted mark is
//! ever re-handed.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tuid_core::error::Result;
use tuid_core::traits::CounterPersistence;
use tuid_core::types::Tuid;

/// How many TUIDs get reserved (and persisted) per durability round-trip.
const DEFAULT_BLOCK_SIZE: u64 = 256;

/// The monotonic TUID allocator.
pub struct TuidAllocator<P: CounterPersistence> {
    persistence: P,
    next: AtomicU64,
    reserved_up_to: Mutex<u64>,
    block_size: u64,
}

impl<P: CounterPersistence> TuidAllocator<P> {
    /// Load the allocator's state from `persistence` and start handing out
    /// TUIDs above the last persisted high-water mark.
    pub fn new(persistence: P) -> Result<Self> {
        Self::with_block_size(persistence, DEFAULT_BLOCK_SIZE)
    }

    /// Like [`Self::new`] with an explicit reservation block size, mainly
    /// for tests that want to observe reservation boundaries quickly.
    pub fn with_block_size(persistence: P, block_size: u64) -> Result<Self> {
        let high_water_mark = persistence.load()?;
        Ok(TuidAllocator {
            persistence,
            next: AtomicU64::new(high_water_mark + 1),
            reserved_up_to: Mutex::new(high_water_mark),
            block_size,
        })
    }

    /// Allocate the next TUID (spec §4.1, I6: each value handed out exactly
    /// once, ever increasing).
    pub fn next_tuid(&self) -> Result<Tuid> {
        loop {
            let candidate = self.next.fetch_add(1, Ordering::Relaxed);
            let reserved = *self.reserved_up_to.lock();
            if candidate <= reserved {
                return Ok(Tuid::new(candidate));
            }
            self.reserve_through(candidate)?;
            return Ok(Tuid::new(candidate));
        }
    }

    /// Allocate `count` consecutive TUIDs in one reservation round-trip,
    /// used by the Annotation Acquirer (C5) when sizing a freshly fetched
    /// file.
    pub fn next_tuids(&self, count: usize) -> Result<Vec<Tuid>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let first = self.next.fetch_add(count as u64, Ordering::Relaxed);
        let last = first + count as u64 - 1;
        if last > *self.reserved_up_to.lock() {
            self.reserve_through(last)?;
        }
        Ok((first..=last).map(Tuid::new).collect())
    }

    fn reserve_through(&self, at_least: u64) -> Result<()> {
        let mut reserved = self.reserved_up_to.lock();
        if at_least <= *reserved {
            return Ok(());
        }
        let block_end = at_least.max(*reserved + self.block_size);
        self.persistence.persist(block_end)?;
        *reserved = block_end;
        tracing::debug!(high_water_mark = block_end, "reserved TUID block");
        Ok(())
    }

    /// The highest TUID durably reserved so far, for metrics and tests.
    pub fn high_water_mark(&self) -> u64 {
        *self.reserved_up_to.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicU64 as Cell;
    use std::sync::Mutex as StdMutex;

    struct MemoryPersistence {
        value: StdMutex<u64>,
        persist_calls: Cell,
    }

    impl MemoryPersistence {
        fn new() -> Self {
            MemoryPersistence {
                value: StdMutex::new(0),
                persist_calls: Cell::new(0),
            }
        }
    }

    impl CounterPersistence for MemoryPersistence {
        fn load(&self) -> Result<u64> {
            Ok(*self.value.lock().unwrap())
        }

        fn persist(&self, high_water_mark: u64) -> Result<()> {
            *self.value.lock().unwrap() = high_water_mark;
            self.persist_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn allocates_strictly_increasing_values() {
        let allocator = TuidAllocator::with_block_size(MemoryPersistence::new(), 4).unwrap();
        let mut previous = 0;
        for _ in 0..10 {
            let tuid = allocator.next_tuid().unwrap();
            assert!(tuid.value() > previous);
            previous = tuid.value();
        }
    }

    #[test]
    fn resumes_above_persisted_high_water_mark() {
        let persistence = MemoryPersistence::new();
        persistence.persist(100).unwrap();
        let allocator = TuidAllocator::with_block_size(persistence, 4).unwrap();
        let tuid = allocator.next_tuid().unwrap();
        assert_eq!(tuid.value(), 101);
    }

    #[test]
    fn batch_allocation_never_overlaps_single_allocation() {
        let allocator = TuidAllocator::with_block_size(MemoryPersistence::new(), 8).unwrap();
        let first = allocator.next_tuid().unwrap();
        let batch = allocator.next_tuids(5).unwrap();
        assert_eq!(batch.first().unwrap().value(), first.value() + 1);
        assert_eq!(batch.len(), 5);
    }

    proptest::proptest! {
        /// P3: after N calls (mixing single and batch allocation), the
        /// high-water mark is >= N + initial and every handed-out value is
        /// distinct.
        #[test]
        fn monotonic_allocation_never_repeats(
            batch_sizes in proptest::collection::vec(0usize..6, 1..30),
            initial in 0u64..50,
            block_size in 1u64..16,
        ) {
            let persistence = MemoryPersistence::new();
            persistence.persist(initial).unwrap();
            let allocator = TuidAllocator::with_block_size(persistence, block_size).unwrap();

            let mut seen = std::collections::HashSet::new();
            let mut handed_out = 0u64;
            let mut previous = initial;
            for size in batch_sizes {
                if size == 0 {
                    let tuid = allocator.next_tuid().unwrap();
                    prop_assert!(tuid.value() > previous);
                    prop_assert!(seen.insert(tuid.value()));
                    previous = tuid.value();
                    handed_out += 1;
                } else {
                    let batch = allocator.next_tuids(size).unwrap();
                    prop_assert_eq!(batch.len(), size);
                    for tuid in batch {
                        prop_assert!(tuid.value() > previous);
                        prop_assert!(seen.insert(tuid.value()));
                        previous = tuid.value();
                    }
                    handed_out += size as u64;
                }
            }
            prop_assert!(allocator.high_water_mark() >= initial + handed_out);
        }
    }
}

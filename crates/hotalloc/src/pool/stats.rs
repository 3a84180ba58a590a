//! Pool counters. All atomics use relaxed ordering: they are observational
//! and never synchronize anything.

use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct PoolMetrics {
    pub alloc_calls: AtomicU64,
    pub free_calls: AtomicU64,
    pub alloc_failures: AtomicU64,
    pub cas_failures: AtomicU64,
    pub in_use: AtomicU64,
    pub high_watermark: AtomicU64,
}

impl PoolMetrics {
    /// Count one successful allocation; returns the new occupancy.
    #[inline]
    pub(crate) fn on_alloc_success(&self) -> u64 {
        let occupancy = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        self.high_watermark.fetch_max(occupancy, Ordering::Relaxed);
        occupancy
    }

    /// Count one deallocation; returns the new occupancy.
    #[inline]
    pub(crate) fn on_free(&self) -> u64 {
        self.free_calls.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_sub(1, Ordering::Relaxed) - 1
    }
}

/// Value snapshot of a pool's counters and geometry.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub capacity: usize,
    pub object_size: usize,
    pub aligned_object_size: usize,
    pub alloc_calls: u64,
    pub free_calls: u64,
    pub alloc_failures: u64,
    pub cas_failures: u64,
    pub high_watermark: u64,
    pub in_use: u64,
}

impl PoolMetrics {
    pub(crate) fn snapshot(
        &self,
        capacity: usize,
        object_size: usize,
        aligned_object_size: usize,
    ) -> PoolStats {
        PoolStats {
            capacity,
            object_size,
            aligned_object_size,
            alloc_calls: self.alloc_calls.load(Ordering::Relaxed),
            free_calls: self.free_calls.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            cas_failures: self.cas_failures.load(Ordering::Relaxed),
            high_watermark: self.high_watermark.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_is_monotonic() {
        let m = PoolMetrics::default();
        assert_eq!(m.on_alloc_success(), 1);
        assert_eq!(m.on_alloc_success(), 2);
        assert_eq!(m.on_free(), 1);
        assert_eq!(m.on_alloc_success(), 2);
        let s = m.snapshot(8, 32, 32);
        assert_eq!(s.high_watermark, 2);
        assert_eq!(s.in_use, 2);
        assert_eq!(s.free_calls, 1);
    }
}

//! Size-class dispatcher: routes variable-size requests to a family of
//! fixed-size pools keyed by the next power of two.
//!
//! Deallocation takes the same size the caller allocated with; that is
//! what locates the owning bucket. Nothing is embedded in the returned
//! pointer, which keeps the hot path header-free.

use crate::pool::fixed::PoolAllocator;
use crate::pool::lockfree::LockFreePoolAllocator;
use crate::pool::options::PoolOptions;
use crate::pool::stats::PoolStats;
use core::ptr;
use std::collections::BTreeMap;

/// The operations the dispatcher needs from a fixed-size pool.
pub trait FixedPool {
    fn with_options(object_size: usize, capacity: usize, opts: PoolOptions) -> Self;
    fn allocate(&mut self) -> *mut u8;
    fn deallocate(&mut self, ptr: *mut u8);
    fn stats(&self) -> PoolStats;
}

impl FixedPool for PoolAllocator {
    fn with_options(object_size: usize, capacity: usize, opts: PoolOptions) -> Self {
        PoolAllocator::with_options(object_size, capacity, opts)
    }

    fn allocate(&mut self) -> *mut u8 {
        PoolAllocator::allocate(self)
    }

    fn deallocate(&mut self, ptr: *mut u8) {
        PoolAllocator::deallocate(self, ptr)
    }

    fn stats(&self) -> PoolStats {
        self.get_stats()
    }
}

impl FixedPool for LockFreePoolAllocator {
    fn with_options(object_size: usize, capacity: usize, opts: PoolOptions) -> Self {
        LockFreePoolAllocator::with_options(object_size, capacity, opts)
    }

    fn allocate(&mut self) -> *mut u8 {
        LockFreePoolAllocator::allocate(self)
    }

    fn deallocate(&mut self, ptr: *mut u8) {
        LockFreePoolAllocator::deallocate(self, ptr)
    }

    fn stats(&self) -> PoolStats {
        self.get_stats()
    }
}

pub struct SizeClassPool<P: FixedPool = PoolAllocator> {
    max_object_size: usize,
    objects_per_bucket: usize,
    opts: PoolOptions,
    buckets: BTreeMap<usize, P>,
}

impl<P: FixedPool> Default for SizeClassPool<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: FixedPool> SizeClassPool<P> {
    pub fn new() -> Self {
        Self::with_limits(1024, 1024)
    }

    pub fn with_limits(max_object_size: usize, objects_per_bucket: usize) -> Self {
        Self::with_options(max_object_size, objects_per_bucket, PoolOptions::default())
    }

    pub fn with_options(
        max_object_size: usize,
        objects_per_bucket: usize,
        opts: PoolOptions,
    ) -> Self {
        SizeClassPool {
            max_object_size,
            objects_per_bucket,
            opts,
            buckets: BTreeMap::new(),
        }
    }

    #[inline]
    fn bucket_for(size: usize) -> usize {
        size.max(1).next_power_of_two()
    }

    /// Route to the pool for `size`'s class, creating it on first use.
    /// Null when `size` exceeds `max_object_size` or the class is full.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        if size > self.max_object_size {
            return ptr::null_mut();
        }
        let class = Self::bucket_for(size);
        let per_bucket = self.objects_per_bucket;
        let opts = &self.opts;
        self.buckets
            .entry(class)
            .or_insert_with(|| P::with_options(class, per_bucket, opts.clone()))
            .allocate()
    }

    /// Return `ptr` to the class it was allocated from. The caller must
    /// supply the same `size` used at allocation.
    pub fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        if ptr.is_null() || size > self.max_object_size {
            return;
        }
        let class = Self::bucket_for(size);
        if let Some(pool) = self.buckets.get_mut(&class) {
            pool.deallocate(ptr);
        }
    }

    /// Move `value` into a slot of the matching class.
    pub fn construct<T>(&mut self, value: T) -> Option<core::ptr::NonNull<T>> {
        crate::construct::construct_in(self, value)
    }

    /// Drop the value in place and return its slot.
    ///
    /// # Safety
    /// `ptr` must have come from `construct::<T>` on this dispatcher and
    /// not been destroyed already.
    pub unsafe fn destroy<T>(&mut self, ptr: core::ptr::NonNull<T>) {
        crate::construct::destroy_in(self, ptr);
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    /// Number of size classes instantiated so far.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Counter snapshot for the class serving `size`, if instantiated.
    pub fn stats_for(&self, size: usize) -> Option<PoolStats> {
        self.buckets.get(&Self::bucket_for(size)).map(P::stats)
    }
}

/// Dispatcher over lock-free pools, for callers that hand the whole
/// structure a lock of its own (the map itself is not concurrent).
pub type LockFreeSizeClassPool = SizeClassPool<LockFreePoolAllocator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_next_power_of_two() {
        assert_eq!(SizeClassPool::<PoolAllocator>::bucket_for(0), 1);
        assert_eq!(SizeClassPool::<PoolAllocator>::bucket_for(1), 1);
        assert_eq!(SizeClassPool::<PoolAllocator>::bucket_for(3), 4);
        assert_eq!(SizeClassPool::<PoolAllocator>::bucket_for(64), 64);
        assert_eq!(SizeClassPool::<PoolAllocator>::bucket_for(65), 128);
    }

    #[test]
    fn oversized_requests_return_null() {
        let mut pool: SizeClassPool = SizeClassPool::with_limits(128, 8);
        assert!(pool.allocate(129).is_null());
        assert_eq!(pool.bucket_count(), 0);
    }

    #[test]
    fn buckets_are_created_lazily_and_shared_per_class() {
        let mut pool: SizeClassPool = SizeClassPool::with_limits(1024, 8);
        let a = pool.allocate(100); // class 128
        let b = pool.allocate(128); // same class
        let c = pool.allocate(10); // class 16
        assert_eq!(pool.bucket_count(), 2);
        pool.deallocate(a, 100);
        pool.deallocate(b, 128);
        pool.deallocate(c, 10);
        let s = pool.stats_for(100).unwrap();
        assert_eq!(s.alloc_calls, 2);
        assert_eq!(s.free_calls, 2);
        assert_eq!(s.in_use, 0);
    }

    #[test]
    fn class_exhaustion_is_a_null_not_an_abort() {
        let mut pool: SizeClassPool = SizeClassPool::with_limits(64, 2);
        let a = pool.allocate(32);
        let b = pool.allocate(32);
        assert!(!a.is_null() && !b.is_null());
        assert!(pool.allocate(32).is_null());
        pool.deallocate(a, 32);
        pool.deallocate(b, 32);
    }
}

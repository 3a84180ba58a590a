//! Lock-free fixed-size object pool.
//!
//! Same slab layout as [`PoolAllocator`](crate::pool::PoolAllocator), but
//! the free list is a Treiber stack: an atomic head plus an out-of-line
//! link table with one entry per slot. Keeping links outside the slots
//! means poisoning a freed slot's body can never corrupt list integrity,
//! and a popper's link read never races a payload write.
//!
//! Ordering protocol: push stores `links[i]` before publishing slot `i`
//! with a release CAS on the head; pop loads the head with acquire and
//! then reads the link. Any thread that observes slot `i` as head
//! therefore observes the link published for it. Reordering those two
//! writes would reintroduce the ABA hazard described in the pop loop.

use crate::histogram::{Histogram, HistogramSnapshot};
use crate::platform;
use crate::pool::options::PoolOptions;
use crate::pool::quarantine::QuarantineRing;
use crate::pool::stats::{PoolMetrics, PoolStats};
use crate::util::{abort_with_message, align_up, MIN_ALIGN};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use parking_lot::Mutex;

const LINK_BYTES: usize = core::mem::size_of::<*mut u8>();

pub struct LockFreePoolAllocator {
    slab: *mut u8,
    mapped_size: usize,
    object_size: usize,
    aligned_object_size: usize,
    capacity: usize,
    head: AtomicPtr<u8>,
    /// `links[i]` is the next-free pointer for slot `i`. Written only by
    /// the thread freeing slot `i`, before the CAS that publishes it.
    links: Box<[AtomicPtr<u8>]>,
    opts: PoolOptions,
    metrics: PoolMetrics,
    quarantine: Option<Mutex<QuarantineRing>>,
    histogram: Option<Histogram>,
}

unsafe impl Send for LockFreePoolAllocator {}
unsafe impl Sync for LockFreePoolAllocator {}

impl LockFreePoolAllocator {
    pub fn new(object_size: usize, capacity: usize) -> Self {
        Self::with_options(object_size, capacity, PoolOptions::default())
    }

    pub fn with_options(object_size: usize, capacity: usize, opts: PoolOptions) -> Self {
        let aligned_object_size = align_up(object_size.max(LINK_BYTES), MIN_ALIGN);

        let (slab, mapped_size) = if capacity > 0 {
            let mapped = align_up(aligned_object_size * capacity, platform::page_size());
            let slab = unsafe { platform::map_anonymous(mapped) };
            if slab.is_null() {
                abort_with_message("chunk source exhausted: pool slab mapping failed");
            }
            (slab, mapped)
        } else {
            (ptr::null_mut(), 0)
        };

        let links: Box<[AtomicPtr<u8>]> = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        let pool = LockFreePoolAllocator {
            slab,
            mapped_size,
            object_size,
            aligned_object_size,
            capacity,
            head: AtomicPtr::new(ptr::null_mut()),
            links,
            quarantine: (opts.quarantine_size > 0)
                .then(|| Mutex::new(QuarantineRing::new(opts.quarantine_size))),
            histogram: opts
                .sample_histograms
                .then(|| Histogram::new(0, capacity as u64, opts.histogram_buckets)),
            opts,
            metrics: PoolMetrics::default(),
        };

        // Construction is single-threaded: thread the link table and
        // pre-poison whole slot bodies (links live out of line).
        if capacity > 0 {
            for i in 0..capacity {
                let next = if i + 1 < capacity {
                    unsafe { pool.slot_ptr(i + 1) }
                } else {
                    ptr::null_mut()
                };
                pool.links[i].store(next, Ordering::Relaxed);
                if pool.opts.poison_on_free {
                    unsafe {
                        ptr::write_bytes(pool.slot_ptr(i), pool.opts.poison_byte, aligned_object_size);
                    }
                }
            }
            pool.head.store(pool.slab, Ordering::Release);
        }
        pool
    }

    #[inline]
    unsafe fn slot_ptr(&self, index: usize) -> *mut u8 {
        self.slab.add(index * self.aligned_object_size)
    }

    /// Validate that `ptr` is a slot of this pool and return its index.
    /// Out-of-range or misaligned pointers are program bugs, not runtime
    /// conditions: abort with a diagnostic.
    #[inline]
    fn checked_slot_index(&self, ptr: *mut u8) -> usize {
        let base = self.slab as usize;
        let addr = ptr as usize;
        let Some(offset) = addr.checked_sub(base) else {
            abort_with_message("pointer below pool slab handed to lock-free pool");
        };
        if offset >= self.capacity * self.aligned_object_size {
            abort_with_message("pointer past pool slab handed to lock-free pool");
        }
        if offset % self.aligned_object_size != 0 {
            abort_with_message("misaligned slot pointer handed to lock-free pool");
        }
        offset / self.aligned_object_size
    }

    /// Pop a slot, or null when the free list is empty. Lock-free: a
    /// failing CAS retries with the freshly observed head.
    pub fn allocate(&self) -> *mut u8 {
        self.metrics.alloc_calls.fetch_add(1, Ordering::Relaxed);

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head.is_null() {
                self.metrics.alloc_failures.fetch_add(1, Ordering::Relaxed);
                return ptr::null_mut();
            }
            let idx = self.checked_slot_index(head);
            // The link for `head` was published by the release CAS that
            // made it head; the acquire load above makes it visible.
            let next = self.links[idx].load(Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(observed) => {
                    self.metrics.cas_failures.fetch_add(1, Ordering::Relaxed);
                    head = observed;
                }
            }
        }

        let occupancy = self.metrics.on_alloc_success();

        if self.opts.verify_poison_on_alloc && self.opts.poison_on_free {
            unsafe {
                self.verify_slot(head);
            }
        }
        if self.opts.zero_on_alloc {
            unsafe {
                ptr::write_bytes(head, 0, self.aligned_object_size);
            }
        }
        if let Some(hook) = &self.opts.on_alloc {
            hook(head, self.aligned_object_size);
        }
        if let Some(h) = &self.histogram {
            h.record(occupancy);
        }
        head
    }

    /// Return a slot to the pool. Null is a no-op; a pointer that is not a
    /// slot of this pool aborts.
    pub fn deallocate(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        self.checked_slot_index(ptr);

        if let Some(hook) = &self.opts.on_free {
            hook(ptr, self.aligned_object_size);
        }
        if self.opts.poison_on_free {
            // Whole-slot poison: links are out of line, nothing here is
            // load-bearing for the free list.
            unsafe {
                core::ptr::write_bytes(ptr, self.opts.poison_byte, self.aligned_object_size);
            }
        }

        let to_free = match &self.quarantine {
            Some(q) => q.lock().push(ptr),
            None => Some(ptr),
        };
        if let Some(p) = to_free {
            self.push_slot(p);
        }

        let occupancy = self.metrics.on_free();
        if let Some(h) = &self.histogram {
            h.record(occupancy);
        }
    }

    /// CAS-push a slot onto the free list. The link store is sequenced
    /// before the release CAS that publishes the slot as head.
    fn push_slot(&self, ptr: *mut u8) {
        let idx = self.checked_slot_index(ptr);
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            self.links[idx].store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(head, ptr, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => {
                    self.metrics.cas_failures.fetch_add(1, Ordering::Relaxed);
                    head = observed;
                }
            }
        }
    }

    /// Abort if any byte of the slot no longer matches the poison
    /// pattern: something wrote through a dangling pointer.
    unsafe fn verify_slot(&self, slot: *mut u8) {
        for i in 0..self.aligned_object_size {
            let got = slot.add(i).read();
            if got != self.opts.poison_byte {
                abort_with_message(&format!(
                    "use-after-free detected: poison mismatch at byte {i} (found {got:#04x}, expected {:#04x})",
                    self.opts.poison_byte
                ));
            }
        }
    }

    pub fn used(&self) -> usize {
        self.metrics.in_use.load(Ordering::Relaxed) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn aligned_object_size(&self) -> usize {
        self.aligned_object_size
    }

    pub fn get_stats(&self) -> PoolStats {
        self.metrics
            .snapshot(self.capacity, self.object_size, self.aligned_object_size)
    }

    /// Occupancy distribution, when `sample_histograms` is on.
    pub fn occupancy_histogram(&self) -> Option<HistogramSnapshot> {
        self.histogram.as_ref().map(Histogram::snapshot)
    }

    /// Pop a slot and move `value` into it. None when the pool is full.
    pub fn construct<T>(&self, value: T) -> Option<core::ptr::NonNull<T>> {
        debug_assert!(core::mem::size_of::<T>() <= self.aligned_object_size);
        debug_assert!(core::mem::align_of::<T>() <= MIN_ALIGN);
        let raw = self.allocate() as *mut T;
        core::ptr::NonNull::new(raw).map(|nn| {
            unsafe {
                nn.as_ptr().write(value);
            }
            nn
        })
    }

    /// Drop the value in place and return its slot to the pool.
    ///
    /// # Safety
    /// `ptr` must have come from `construct` on this pool and not been
    /// destroyed already.
    pub unsafe fn destroy<T>(&self, ptr: core::ptr::NonNull<T>) {
        core::ptr::drop_in_place(ptr.as_ptr());
        self.deallocate(ptr.as_ptr() as *mut u8);
    }
}

impl Drop for LockFreePoolAllocator {
    fn drop(&mut self) {
        if !self.slab.is_null() {
            unsafe {
                platform::unmap(self.slab, self.mapped_size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_and_push_round_trip() {
        let pool = LockFreePoolAllocator::new(64, 4);
        let a = pool.allocate();
        let b = pool.allocate();
        assert!(!a.is_null() && !b.is_null());
        assert_ne!(a, b);
        pool.deallocate(a);
        pool.deallocate(b);
        let s = pool.get_stats();
        assert_eq!(s.in_use, 0);
        assert_eq!(s.alloc_calls, 2);
        assert_eq!(s.free_calls, 2);
    }

    #[test]
    fn exhaustion_counts_failures_without_touching_in_use() {
        let pool = LockFreePoolAllocator::new(16, 2);
        let a = pool.allocate();
        let b = pool.allocate();
        assert!(pool.allocate().is_null());
        let s = pool.get_stats();
        assert_eq!(s.alloc_failures, 1);
        assert_eq!(s.in_use, 2);
        pool.deallocate(a);
        pool.deallocate(b);
    }

    #[test]
    fn freed_slots_come_back_lifo_without_quarantine() {
        let pool = LockFreePoolAllocator::new(32, 4);
        let a = pool.allocate();
        pool.deallocate(a);
        let b = pool.allocate();
        assert_eq!(a, b);
        pool.deallocate(b);
    }

    #[test]
    fn occupancy_histogram_samples_every_transition() {
        let pool =
            LockFreePoolAllocator::with_options(32, 8, PoolOptions {
                sample_histograms: true,
                histogram_buckets: 8,
                ..PoolOptions::default()
            });
        let p = pool.allocate();
        pool.deallocate(p);
        let snap = pool.occupancy_histogram().unwrap();
        assert_eq!(snap.counts.iter().sum::<u64>(), 2);
    }
}

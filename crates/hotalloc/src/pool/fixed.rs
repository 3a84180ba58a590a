//! Single-threaded fixed-size object pool.
//!
//! One slab, equally sized slots, an intrusive free list threaded through
//! the first word of each free slot. Because the link lives inside the
//! slot, poisoning covers only the slot tail; the lock-free variant moves
//! links out of line and poisons whole slots.

use crate::histogram::{Histogram, HistogramSnapshot};
use crate::platform;
use crate::pool::options::PoolOptions;
use crate::pool::quarantine::QuarantineRing;
use crate::pool::stats::{PoolMetrics, PoolStats};
use crate::util::{abort_with_message, align_up, MIN_ALIGN};
use core::ptr;
use core::sync::atomic::Ordering;

const LINK_BYTES: usize = core::mem::size_of::<*mut u8>();

pub struct PoolAllocator {
    slab: *mut u8,
    mapped_size: usize,
    object_size: usize,
    aligned_object_size: usize,
    capacity: usize,
    free_head: *mut u8,
    opts: PoolOptions,
    metrics: PoolMetrics,
    quarantine: Option<QuarantineRing>,
    histogram: Option<Histogram>,
}

// Single-owner; the slab pointer moves with the pool value.
unsafe impl Send for PoolAllocator {}

impl PoolAllocator {
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

        let mut pool = PoolAllocator {
            slab,
            mapped_size,
            object_size,
            aligned_object_size,
            capacity,
            free_head: ptr::null_mut(),
            quarantine: (opts.quarantine_size > 0)
                .then(|| QuarantineRing::new(opts.quarantine_size)),
            histogram: opts
                .sample_histograms
                .then(|| Histogram::new(0, capacity as u64, opts.histogram_buckets)),
            opts,
            metrics: PoolMetrics::default(),
        };
        pool.build_free_list();
        pool
    }

    /// Thread the initial free list through the slots: each slot's first
    /// word points at the next slot, the last at null.
    fn build_free_list(&mut self) {
        if self.capacity == 0 {
            return;
        }
        unsafe {
            for i in 0..self.capacity {
                let slot = self.slot_ptr(i);
                let next = if i + 1 < self.capacity {
                    self.slot_ptr(i + 1)
                } else {
                    ptr::null_mut()
                };
                (slot as *mut *mut u8).write(next);
                if self.opts.poison_on_free {
                    self.poison_tail(slot);
                }
            }
        }
        self.free_head = self.slab;
    }

    #[inline]
    unsafe fn slot_ptr(&self, index: usize) -> *mut u8 {
        self.slab.add(index * self.aligned_object_size)
    }

    /// Pop a slot, or null when the free list is empty.
    pub fn allocate(&mut self) -> *mut u8 {
        self.metrics.alloc_calls.fetch_add(1, Ordering::Relaxed);

        let head = self.free_head;
        if head.is_null() {
            self.metrics.alloc_failures.fetch_add(1, Ordering::Relaxed);
            return ptr::null_mut();
        }
        self.free_head = unsafe { (head as *const *mut u8).read() };

        let occupancy = self.metrics.on_alloc_success();

        if self.opts.verify_poison_on_alloc && self.opts.poison_on_free {
            unsafe {
                self.verify_tail(head);
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

    /// Return a slot to the pool. Null is a no-op.
    pub fn deallocate(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        if let Some(hook) = &self.opts.on_free {
            hook(ptr, self.aligned_object_size);
        }
        if self.opts.poison_on_free {
            unsafe {
                self.poison_tail(ptr);
            }
        }

        // With a quarantine, the slot parks there and only a FIFO-evicted
        // older slot (if any) reaches the free list now.
        let to_free = match &mut self.quarantine {
            Some(q) => q.push(ptr),
            None => Some(ptr),
        };
        if let Some(p) = to_free {
            self.push_free(p);
        }

        let occupancy = self.metrics.on_free();
        if let Some(h) = &self.histogram {
            h.record(occupancy);
        }
    }

    #[inline]
    fn push_free(&mut self, ptr: *mut u8) {
        unsafe {
            (ptr as *mut *mut u8).write(self.free_head);
        }
        self.free_head = ptr;
    }

    /// Fill everything after the free-list link with the poison byte.
    unsafe fn poison_tail(&self, slot: *mut u8) {
        ptr::write_bytes(
            slot.add(LINK_BYTES),
            self.opts.poison_byte,
            self.aligned_object_size - LINK_BYTES,
        );
    }

    /// Abort if the slot tail no longer matches the poison pattern: some
    /// write landed on freed memory.
    unsafe fn verify_tail(&self, slot: *mut u8) {
        for i in LINK_BYTES..self.aligned_object_size {
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
    pub fn construct<T>(&mut self, value: T) -> Option<core::ptr::NonNull<T>> {
        crate::construct::construct_in(self, value)
    }

    /// Drop the value in place and return its slot to the pool.
    ///
    /// # Safety
    /// `ptr` must have come from `construct` on this pool and not been
    /// destroyed already.
    pub unsafe fn destroy<T>(&mut self, ptr: core::ptr::NonNull<T>) {
        crate::construct::destroy_in(self, ptr);
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        if !self.slab.is_null() {
            unsafe {
                platform::unmap(self.slab, self.mapped_size);
            }
        }
    }
}

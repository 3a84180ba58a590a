//! Typed placement-construction over any raw allocator.
//!
//! The allocators hand out raw bytes; this seam turns them into typed
//! storage: `construct_in` moves a value into freshly allocated memory,
//! `destroy_in` drops it in place and returns the storage (a no-op for the
//! arena, which only frees in bulk).

use crate::arena::ArenaAllocator;
use crate::pool::size_class::FixedPool;
use crate::pool::{LockFreePoolAllocator, PoolAllocator, SizeClassPool};
use crate::util::MIN_ALIGN;
use core::ptr::{self, NonNull};

/// A raw allocator that typed construction can layer over.
pub trait RawAlloc {
    /// Allocate `bytes` aligned to `align`, or null if this allocator
    /// cannot satisfy the request.
    fn alloc_raw(&mut self, bytes: usize, align: usize) -> *mut u8;

    /// Return storage obtained from `alloc_raw`. Allocators that only
    /// free in bulk make this a no-op.
    ///
    /// # Safety
    /// `ptr` must have come from `alloc_raw` on this allocator with the
    /// same `bytes`, and must not be returned twice.
    unsafe fn dealloc_raw(&mut self, ptr: *mut u8, bytes: usize);
}

/// Move `value` into storage from `alloc`. None when the allocator is
/// exhausted or cannot meet `T`'s layout; `value` is dropped in that case.
pub fn construct_in<T, A: RawAlloc + ?Sized>(alloc: &mut A, value: T) -> Option<NonNull<T>> {
    let raw = alloc.alloc_raw(core::mem::size_of::<T>(), core::mem::align_of::<T>()) as *mut T;
    NonNull::new(raw).map(|nn| {
        unsafe {
            nn.as_ptr().write(value);
        }
        nn
    })
}

/// Drop the value in place, then hand its storage back.
///
/// # Safety
/// `ptr` must have come from `construct_in` on this allocator and not been
/// destroyed already.
pub unsafe fn destroy_in<T, A: RawAlloc + ?Sized>(alloc: &mut A, ptr: NonNull<T>) {
    ptr::drop_in_place(ptr.as_ptr());
    alloc.dealloc_raw(ptr.as_ptr() as *mut u8, core::mem::size_of::<T>());
}

impl RawAlloc for ArenaAllocator {
    fn alloc_raw(&mut self, bytes: usize, align: usize) -> *mut u8 {
        self.allocate(bytes, align).as_ptr()
    }

    unsafe fn dealloc_raw(&mut self, _ptr: *mut u8, _bytes: usize) {
        // Arena storage is reclaimed in bulk by reset/release.
    }
}

impl RawAlloc for PoolAllocator {
    fn alloc_raw(&mut self, bytes: usize, align: usize) -> *mut u8 {
        if bytes > self.aligned_object_size() || align > MIN_ALIGN {
            return ptr::null_mut();
        }
        self.allocate()
    }

    unsafe fn dealloc_raw(&mut self, ptr: *mut u8, _bytes: usize) {
        self.deallocate(ptr);
    }
}

impl RawAlloc for LockFreePoolAllocator {
    fn alloc_raw(&mut self, bytes: usize, align: usize) -> *mut u8 {
        if bytes > self.aligned_object_size() || align > MIN_ALIGN {
            return ptr::null_mut();
        }
        LockFreePoolAllocator::allocate(self)
    }

    unsafe fn dealloc_raw(&mut self, ptr: *mut u8, _bytes: usize) {
        LockFreePoolAllocator::deallocate(self, ptr);
    }
}

impl<P: FixedPool> RawAlloc for SizeClassPool<P> {
    fn alloc_raw(&mut self, bytes: usize, align: usize) -> *mut u8 {
        if align > MIN_ALIGN {
            return ptr::null_mut();
        }
        self.allocate(bytes)
    }

    unsafe fn dealloc_raw(&mut self, ptr: *mut u8, bytes: usize) {
        self.deallocate(ptr, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted {
        drops: Arc<AtomicUsize>,
        payload: u64,
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn pool_construct_runs_ctor_once_and_dtor_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut pool = PoolAllocator::new(core::mem::size_of::<Counted>(), 4);

        let p = construct_in(
            &mut pool,
            Counted {
                drops: Arc::clone(&drops),
                payload: 99,
            },
        )
        .unwrap();
        assert_eq!(unsafe { p.as_ref() }.payload, 99);
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        unsafe {
            destroy_in(&mut pool, p);
        }
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn exhausted_pool_drops_the_value_and_returns_none() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut pool = PoolAllocator::new(core::mem::size_of::<Counted>(), 1);
        let first = pool.allocate();
        assert!(!first.is_null());

        let none = construct_in(
            &mut pool,
            Counted {
                drops: Arc::clone(&drops),
                payload: 0,
            },
        );
        assert!(none.is_none());
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        pool.deallocate(first);
    }

    #[test]
    fn arena_destroy_runs_dtor_but_keeps_storage() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut arena = ArenaAllocator::new(crate::arena::ArenaOptions::default());
        let before = arena.total_allocated();

        let p = construct_in(
            &mut arena,
            Counted {
                drops: Arc::clone(&drops),
                payload: 1,
            },
        )
        .unwrap();
        unsafe {
            destroy_in(&mut arena, p);
        }
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        assert!(arena.total_allocated() > before);
    }

    #[test]
    fn size_class_construct_uses_type_size_for_the_bucket() {
        let mut pool: SizeClassPool = SizeClassPool::with_limits(256, 4);
        let p = pool.construct(0xDEAD_BEEFu64).unwrap();
        assert_eq!(unsafe { *p.as_ref() }, 0xDEAD_BEEF);
        unsafe {
            pool.destroy(p);
        }
        let s = pool.stats_for(core::mem::size_of::<u64>()).unwrap();
        assert_eq!(s.in_use, 0);
    }
}

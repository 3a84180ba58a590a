//! Thread-local allocator instances.
//!
//! Per-thread instances remove cross-thread contention on the common path:
//! each thread lazily builds its own arena or pool on first touch, and the
//! instance is torn down (chunks and slabs returned) when the thread
//! exits. Pointers from these wrappers must be freed on the thread that
//! allocated them.

use crate::arena::{ArenaAllocator, ArenaOptions};
use crate::config;
use crate::pool::{PoolAllocator, PoolOptions};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static TLS_ARENA: RefCell<Option<ArenaAllocator>> = const { RefCell::new(None) };
    static TLS_POOLS: RefCell<HashMap<u64, PoolAllocator>> = RefCell::new(HashMap::new());
}

/// The calling thread's arena, built with environment-adjusted defaults on
/// first touch.
pub struct ThreadLocalArena;

impl ThreadLocalArena {
    /// Run `f` against this thread's arena.
    pub fn with<R>(f: impl FnOnce(&mut ArenaAllocator) -> R) -> R {
        TLS_ARENA.with(|slot| {
            let mut slot = slot.borrow_mut();
            let arena =
                slot.get_or_insert_with(|| ArenaAllocator::new(config::default_arena_options()));
            f(arena)
        })
    }

    /// Replace this thread's arena with one built from `opts`. Pointers
    /// from the previous instance become invalid.
    pub fn set_options(opts: ArenaOptions) {
        TLS_ARENA.with(|slot| {
            *slot.borrow_mut() = Some(ArenaAllocator::new(opts));
        });
    }

    pub fn allocate(bytes: usize, alignment: usize) -> NonNull<u8> {
        Self::with(|a| a.allocate(bytes, alignment))
    }

    pub fn construct<T>(value: T) -> NonNull<T> {
        Self::with(|a| a.construct(value))
    }

    /// Rewind this thread's arena, if it exists.
    pub fn reset() {
        TLS_ARENA.with(|slot| {
            if let Some(a) = slot.borrow_mut().as_mut() {
                a.reset();
            }
        });
    }

    /// Release this thread's arena chunks, if it exists.
    pub fn release() {
        TLS_ARENA.with(|slot| {
            if let Some(a) = slot.borrow_mut().as_mut() {
                a.release();
            }
        });
    }
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A pool configuration shared across threads; each thread gets its own
/// `PoolAllocator` instance, created on first touch through this handle.
pub struct ThreadLocalPool {
    id: u64,
    object_size: usize,
    capacity: usize,
    opts: PoolOptions,
}

impl ThreadLocalPool {
    pub fn new(object_size: usize, capacity: usize) -> Self {
        Self::with_options(object_size, capacity, config::default_pool_options())
    }

    pub fn with_options(object_size: usize, capacity: usize, opts: PoolOptions) -> Self {
        ThreadLocalPool {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            object_size,
            capacity,
            opts,
        }
    }

    /// Run `f` against the calling thread's instance of this pool.
    pub fn with<R>(&self, f: impl FnOnce(&mut PoolAllocator) -> R) -> R {
        TLS_POOLS.with(|pools| {
            let mut pools = pools.borrow_mut();
            let pool = pools.entry(self.id).or_insert_with(|| {
                PoolAllocator::with_options(self.object_size, self.capacity, self.opts.clone())
            });
            f(pool)
        })
    }

    pub fn allocate(&self) -> *mut u8 {
        self.with(|p| p.allocate())
    }

    pub fn deallocate(&self, ptr: *mut u8) {
        self.with(|p| p.deallocate(ptr));
    }

    pub fn construct<T>(&self, value: T) -> Option<NonNull<T>> {
        self.with(|p| p.construct(value))
    }

    /// # Safety
    /// `ptr` must have come from `construct` on this handle, on this
    /// thread, and not been destroyed already.
    pub unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        self.with(|p| unsafe { p.destroy(ptr) });
    }

    pub fn used(&self) -> usize {
        self.with(|p| p.used())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

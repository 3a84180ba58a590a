//! Pool debug-hygiene tests: zero-on-alloc, poison round trips, quarantine
//! semantics, hooks, and stats consistency.

use hotalloc::{LockFreePoolAllocator, PoolAllocator, PoolOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn debug_strong_zeroes_and_survives_dirty_frees() {
    let pool = LockFreePoolAllocator::with_options(64, 32, PoolOptions::debug_strong(8));
    let aligned = pool.aligned_object_size();

    // Fresh slot arrives fully zeroed.
    let p = pool.allocate();
    assert!(!p.is_null());
    unsafe {
        for i in 0..aligned {
            assert_eq!(p.add(i).read(), 0, "zero_on_alloc failed at byte {i}");
        }
        // Scribble over the whole slot, then free: poison overwrites the
        // scribble, so the next verify-on-alloc pass must stay clean.
        core::ptr::write_bytes(p, 0xCC, aligned);
    }
    pool.deallocate(p);

    let q = pool.allocate();
    assert!(!q.is_null(), "allocate after a dirty free should succeed");
    unsafe {
        for i in 0..aligned {
            assert_eq!(q.add(i).read(), 0, "slot not re-zeroed at byte {i}");
        }
    }
    pool.deallocate(q);
}

#[test]
fn full_quarantine_empties_the_free_list() {
    // Capacity 4, quarantine 4: after freeing everything, every slot sits
    // in quarantine and the free list is empty.
    let opts = PoolOptions {
        poison_on_free: true,
        verify_poison_on_alloc: true,
        zero_on_alloc: true,
        quarantine_size: 4,
        ..PoolOptions::default()
    };
    let pool = LockFreePoolAllocator::with_options(32, 4, opts);

    let ptrs: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
    assert!(ptrs.iter().all(|p| !p.is_null()));
    for p in ptrs {
        pool.deallocate(p);
    }

    assert!(
        pool.allocate().is_null(),
        "all slots are quarantined; allocation must fail"
    );
    let s = pool.get_stats();
    assert_eq!(s.in_use, 0);
    assert_eq!(s.alloc_failures, 1);
}

#[test]
fn quarantine_overflow_flushes_the_oldest_slot() {
    // Capacity 5, quarantine 4: the fifth free evicts the oldest entry to
    // the free list, so one more allocation succeeds.
    let opts = PoolOptions {
        poison_on_free: true,
        verify_poison_on_alloc: true,
        zero_on_alloc: true,
        quarantine_size: 4,
        ..PoolOptions::default()
    };
    let pool = LockFreePoolAllocator::with_options(32, 5, opts);

    let ptrs: Vec<_> = (0..5).map(|_| pool.allocate()).collect();
    assert!(ptrs.iter().all(|p| !p.is_null()));
    for p in &ptrs {
        pool.deallocate(*p);
    }

    let p = pool.allocate();
    assert!(!p.is_null(), "quarantine overflow should have flushed a slot");
    // The flushed slot is the first one freed.
    assert_eq!(p, ptrs[0]);
    pool.deallocate(p);
}

#[test]
fn single_threaded_pool_has_the_same_quarantine_semantics() {
    let opts = PoolOptions {
        poison_on_free: true,
        verify_poison_on_alloc: true,
        quarantine_size: 2,
        ..PoolOptions::default()
    };
    let mut pool = PoolAllocator::with_options(48, 3, opts);

    let a = pool.allocate();
    let b = pool.allocate();
    let c = pool.allocate();
    assert!(!a.is_null() && !b.is_null() && !c.is_null());

    pool.deallocate(a);
    pool.deallocate(b);
    // Free list is empty: a and b are both quarantined.
    assert!(pool.allocate().is_null());

    // Third free overflows the bound and flushes `a`.
    pool.deallocate(c);
    let p = pool.allocate();
    assert_eq!(p, a);
    pool.deallocate(p);
}

#[test]
fn hooks_fire_on_every_alloc_and_free() {
    let allocs = Arc::new(AtomicUsize::new(0));
    let frees = Arc::new(AtomicUsize::new(0));

    let opts = PoolOptions {
        on_alloc: Some({
            let allocs = Arc::clone(&allocs);
            Arc::new(move |_ptr, _size| {
                allocs.fetch_add(1, Ordering::Relaxed);
            })
        }),
        on_free: Some({
            let frees = Arc::clone(&frees);
            Arc::new(move |_ptr, _size| {
                frees.fetch_add(1, Ordering::Relaxed);
            })
        }),
        ..PoolOptions::default()
    };
    let mut pool = PoolAllocator::with_options(64, 4, opts);

    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(pool.allocate());
    }
    // Exhausted allocation does not fire the hook.
    assert!(pool.allocate().is_null());
    for p in held {
        pool.deallocate(p);
    }
    // Null free does not fire the hook.
    pool.deallocate(core::ptr::null_mut());

    assert_eq!(allocs.load(Ordering::Relaxed), 4);
    assert_eq!(frees.load(Ordering::Relaxed), 4);
}

#[test]
fn stats_stay_consistent_through_churn() {
    let pool = LockFreePoolAllocator::with_options(64, 16, PoolOptions::debug_strong(4));

    for round in 1..=8 {
        let held: Vec<_> = (0..round).map(|_| pool.allocate()).collect();
        assert!(held.iter().all(|p| !p.is_null()));

        let s = pool.get_stats();
        assert_eq!(s.alloc_calls - s.free_calls, s.in_use);
        assert!(s.in_use <= s.high_watermark);
        assert!(s.high_watermark <= s.capacity as u64);

        for p in held {
            pool.deallocate(p);
        }
    }

    let s = pool.get_stats();
    assert_eq!(s.in_use, 0);
    assert_eq!(s.alloc_calls, s.free_calls);
    assert_eq!(s.high_watermark, 8);
    assert_eq!(s.alloc_failures, 0);

    let hist = pool.occupancy_histogram().expect("DebugStrong samples histograms");
    assert_eq!(hist.counts.iter().sum::<u64>(), s.alloc_calls + s.free_calls);
}

#[test]
fn construct_and_destroy_run_lifecycle_exactly_once() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked(u64);
    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }
    }

    let pool = LockFreePoolAllocator::new(core::mem::size_of::<Tracked>(), 8);
    let p = pool.construct(Tracked(7)).expect("pool has capacity");
    assert_eq!(unsafe { p.as_ref() }.0, 7);
    assert_eq!(DROPS.load(Ordering::Relaxed), 0);

    unsafe {
        pool.destroy(p);
    }
    assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    assert_eq!(pool.used(), 0);
}

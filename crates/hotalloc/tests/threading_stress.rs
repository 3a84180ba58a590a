//! Lock-free pool tests under real multi-thread contention: metrics
//! consistency after heavy churn, hygiene under contention, and
//! cross-thread free.

use hotalloc::{LockFreePoolAllocator, PoolOptions};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn mt_churn_leaves_metrics_consistent() {
    const THREADS: usize = 6;
    const ITERS: usize = 4000;

    let opts = PoolOptions {
        sample_histograms: true,
        ..PoolOptions::minimal_overhead()
    };
    let pool = Arc::new(LockFreePoolAllocator::with_options(64, 64 * THREADS, opts));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERS {
                    let p = pool.allocate();
                    assert!(!p.is_null(), "unexpected allocation failure under churn");
                    pool.deallocate(p);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker thread panicked");
    }

    let s = pool.get_stats();
    assert_eq!(s.in_use, 0);
    assert_eq!(s.alloc_calls, s.free_calls);
    assert_eq!(s.alloc_calls, (THREADS * ITERS) as u64);
    assert!(s.high_watermark > 0);
    assert_eq!(s.alloc_failures, 0);
}

#[test]
fn mt_stress_with_full_hygiene_and_live_sets() {
    const THREADS: usize = 8;
    const ITERS: usize = 1000;
    const LIVE: usize = 8;

    // Capacity covers the worst case: every thread's full live set plus
    // every quarantined slot, with headroom so allocation never fails.
    let pool = Arc::new(LockFreePoolAllocator::with_options(
        128,
        LIVE * THREADS + 32,
        PoolOptions::debug_strong(16),
    ));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Keep a rolling live set so frees interleave with
                // allocations from other threads instead of ping-ponging
                // one slot.
                let mut live = Vec::with_capacity(LIVE);
                for i in 0..ITERS {
                    let p = pool.allocate();
                    assert!(!p.is_null());
                    unsafe {
                        core::ptr::write_bytes(p, t as u8 ^ i as u8, pool.aligned_object_size());
                    }
                    live.push(p);
                    if live.len() == LIVE {
                        pool.deallocate(live.remove(0));
                    }
                }
                for p in live {
                    pool.deallocate(p);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker thread panicked");
    }

    let s = pool.get_stats();
    assert_eq!(s.in_use, 0);
    assert_eq!(s.alloc_calls, s.free_calls);
    assert!(s.high_watermark >= LIVE as u64);
}

/// Pointers cross thread boundaries by design here: the lock-free pool is
/// thread-safe, one thread allocates and another frees.
#[derive(Clone, Copy)]
struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}

#[test]
fn cross_thread_free_is_safe() {
    const COUNT: usize = 1000;

    let pool = Arc::new(LockFreePoolAllocator::new(64, COUNT));
    let (tx, rx) = std::sync::mpsc::channel::<SendPtr>();

    let producer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for i in 0..COUNT {
                let p = pool.allocate();
                assert!(!p.is_null());
                unsafe {
                    core::ptr::write_bytes(p, i as u8, 64);
                }
                tx.send(SendPtr(p)).expect("consumer hung up");
            }
        })
    };
    let consumer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for sp in rx {
                pool.deallocate(sp.0);
            }
        })
    };

    producer.join().expect("producer panicked");
    consumer.join().expect("consumer panicked");

    let s = pool.get_stats();
    assert_eq!(s.in_use, 0);
    assert_eq!(s.alloc_calls, COUNT as u64);
    assert_eq!(s.free_calls, COUNT as u64);
}

#[test]
fn contention_is_counted_not_failed() {
    // Two threads hammering a tiny pool force CAS retries; they must show
    // up in cas_failures, never as allocation failures.
    const ITERS: usize = 20_000;

    let pool = Arc::new(LockFreePoolAllocator::new(32, 1));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERS {
                    let p = pool.allocate();
                    if !p.is_null() {
                        pool.deallocate(p);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker thread panicked");
    }

    let s = pool.get_stats();
    assert_eq!(s.in_use, 0);
    assert_eq!(s.alloc_calls, s.free_calls + s.alloc_failures);
}

//! Pool configuration and debug-hygiene knobs.

use crate::util::DEFAULT_POISON_BYTE;
use std::sync::Arc;

/// Observation hook invoked with the slot pointer and its aligned size.
///
/// Hooks run on the allocation path and are contractually non-panicking:
/// a panic here unwinds through allocator internals.
pub type PoolHook = Arc<dyn Fn(*mut u8, usize) + Send + Sync>;

#[derive(Clone)]
pub struct PoolOptions {
    /// Zero the whole slot on every allocation.
    pub zero_on_alloc: bool,
    /// Fill freed slots with `poison_byte`. The single-threaded pool
    /// poisons the slot tail (the first word holds the free-list link);
    /// the lock-free pool poisons the whole slot.
    pub poison_on_free: bool,
    /// Verify the poison pattern when a slot is handed out again; a
    /// mismatch means something wrote to freed memory and aborts the
    /// process. Only meaningful together with `poison_on_free`.
    pub verify_poison_on_alloc: bool,
    pub poison_byte: u8,

    /// Hold up to this many freed slots before they become reusable,
    /// widening the use-after-free detection window. 0 disables.
    pub quarantine_size: usize,

    /// Sample pool occupancy into a histogram on every alloc/free.
    pub sample_histograms: bool,
    pub histogram_buckets: usize,

    pub on_alloc: Option<PoolHook>,
    pub on_free: Option<PoolHook>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            zero_on_alloc: false,
            poison_on_free: false,
            verify_poison_on_alloc: false,
            poison_byte: DEFAULT_POISON_BYTE,
            quarantine_size: 0,
            sample_histograms: false,
            histogram_buckets: 64,
            on_alloc: None,
            on_free: None,
        }
    }
}

impl PoolOptions {
    /// Everything on: zeroing, poisoning, verification, quarantine,
    /// histograms. The configuration for shaking out lifetime bugs.
    pub fn debug_strong(quarantine: usize) -> Self {
        PoolOptions {
            zero_on_alloc: true,
            poison_on_free: true,
            verify_poison_on_alloc: true,
            quarantine_size: quarantine,
            sample_histograms: true,
            ..PoolOptions::default()
        }
    }

    /// Everything off; the production hot-path configuration.
    pub fn minimal_overhead() -> Self {
        PoolOptions::default()
    }
}

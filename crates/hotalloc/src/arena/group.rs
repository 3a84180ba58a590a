//! Arena group: a shared recycler for released chunks.
//!
//! Chunks are binned by size class so repeated arena create/grow/release
//! cycles stop hitting the chunk source. One mutex guards all bins;
//! acquire/release are rare next to bump allocation, so contention here is
//! acceptable.

use crate::arena::chunk::{os_alloc_chunk, os_free_chunk, ArenaChunk};
use core::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;

const BIN_COUNT: usize = 6;

/// Bin size classes: 64 KiB, 256 KiB, 1 MiB, 4 MiB, 16 MiB, 64 MiB.
const BIN_BYTES: [usize; BIN_COUNT] = [
    64 * 1024,
    256 * 1024,
    1024 * 1024,
    4 * 1024 * 1024,
    16 * 1024 * 1024,
    64 * 1024 * 1024,
];

/// Smallest bin whose class size covers `bytes`; oversized chunks land in
/// the last bin.
fn bin_index(bytes: usize) -> usize {
    BIN_BYTES
        .iter()
        .position(|&b| b >= bytes)
        .unwrap_or(BIN_COUNT - 1)
}

/// Counter snapshot for the recycler.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupStats {
    pub acquires: u64,
    pub releases: u64,
    /// Acquires satisfied from a bin instead of the chunk source.
    pub reuse_hits: u64,
}

pub struct ArenaGroup {
    bins: Mutex<[Vec<ArenaChunk>; BIN_COUNT]>,
    acquires: AtomicU64,
    releases: AtomicU64,
    reuse_hits: AtomicU64,
}

impl Default for ArenaGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaGroup {
    pub fn new() -> Self {
        ArenaGroup {
            bins: Mutex::new(core::array::from_fn(|_| Vec::new())),
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            reuse_hits: AtomicU64::new(0),
        }
    }

    /// Hand out a chunk of at least `min_bytes` usable bytes, reusing a
    /// cached one when the matching bin is non-empty.
    pub fn acquire(&self, min_bytes: usize, guards: bool, prefer_huge: bool) -> ArenaChunk {
        self.acquires.fetch_add(1, Ordering::Relaxed);
        let idx = bin_index(min_bytes);

        if let Some(mut chunk) = self.bins.lock()[idx].pop() {
            self.reuse_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(target: "hotalloc::group", bin = idx, size = chunk.size, "chunk reused");
            chunk.offset = 0;
            return chunk;
        }

        let want = min_bytes.max(BIN_BYTES[idx]);
        tracing::debug!(target: "hotalloc::group", bin = idx, want, "bin empty, mapping chunk");
        os_alloc_chunk(want, guards, prefer_huge)
    }

    /// Return a chunk into the bin matching its actual size.
    pub fn release(&self, mut chunk: ArenaChunk) {
        if chunk.base.is_null() || chunk.size == 0 {
            return;
        }
        self.releases.fetch_add(1, Ordering::Relaxed);
        chunk.offset = 0;
        let idx = bin_index(chunk.size);
        self.bins.lock()[idx].push(chunk);
    }

    pub fn stats(&self) -> GroupStats {
        GroupStats {
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            reuse_hits: self.reuse_hits.load(Ordering::Relaxed),
        }
    }

    /// Number of chunks currently cached across all bins.
    pub fn cached_chunks(&self) -> usize {
        self.bins.lock().iter().map(Vec::len).sum()
    }
}

impl Drop for ArenaGroup {
    fn drop(&mut self) {
        for bin in self.bins.get_mut().iter_mut() {
            for chunk in bin.iter_mut() {
                os_free_chunk(chunk);
            }
            bin.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_index_picks_smallest_covering_class() {
        assert_eq!(bin_index(1), 0);
        assert_eq!(bin_index(64 * 1024), 0);
        assert_eq!(bin_index(64 * 1024 + 1), 1);
        assert_eq!(bin_index(1024 * 1024), 2);
        assert_eq!(bin_index(usize::MAX), BIN_COUNT - 1);
    }

    #[test]
    fn acquire_after_release_reuses_chunk() {
        let group = ArenaGroup::new();
        let c1 = group.acquire(64 * 1024, false, false);
        assert!(c1.size >= 64 * 1024);
        group.release(c1);
        assert_eq!(group.cached_chunks(), 1);

        // Smaller request maps to the same bin and reuses the cached chunk.
        let c2 = group.acquire(32 * 1024, false, false);
        assert!(c2.size >= 32 * 1024);
        assert_eq!(group.cached_chunks(), 0);
        assert_eq!(group.stats().reuse_hits, 1);
        group.release(c2);
    }
}

//! Bump arena over a growing list of chunks.
//!
//! Allocation advances a cursor inside the current chunk; freeing happens
//! in bulk via [`ArenaAllocator::reset`] (rewind, keep storage) or
//! [`ArenaAllocator::release`] (return chunks to the group or the OS).
//! Every block is preceded by a header recording size, alignment and canary
//! lengths, so [`ArenaAllocator::scan_corruption`] can walk a chunk and
//! check redzones offline.

pub mod chunk;
pub mod group;
pub mod journal;

pub use chunk::{os_alloc_chunk, os_free_chunk, ArenaChunk};
pub use group::{ArenaGroup, GroupStats};
pub use journal::JournalEntry;

use crate::util::{
    abort_with_message, align_up, BLOCK_MAGIC, DEFAULT_CANARY_BYTE, MIN_ALIGN, MIN_CHUNK_BYTES,
};
use core::ptr::NonNull;
use journal::JournalRing;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ArenaOptions {
    /// Size of the first chunk and the growth floor.
    pub initial_chunk_size: usize,
    /// Next chunk size multiplier; values <= 1.0 fall back to 2.0.
    pub growth_factor: f64,
    /// Cap on any single chunk.
    pub max_chunk_size: usize,

    /// Bracket each chunk with inaccessible pages.
    pub guard_pages: bool,
    /// Ask the kernel for transparent huge pages.
    pub prefer_huge: bool,

    /// Write canary redzones around every payload.
    pub use_canaries: bool,
    /// Redzone length in bytes before and after the payload.
    pub canary_size: usize,
    pub canary_byte: u8,

    /// Record allocations of at least `journal_threshold_bytes` into a
    /// fixed ring for offline inspection.
    pub journaling: bool,
    pub journal_threshold_bytes: usize,
}

impl Default for ArenaOptions {
    fn default() -> Self {
        ArenaOptions {
            initial_chunk_size: 1 << 20,
            growth_factor: 2.0,
            max_chunk_size: 1 << 26,
            guard_pages: false,
            prefer_huge: false,
            use_canaries: false,
            canary_size: 0,
            canary_byte: DEFAULT_CANARY_BYTE,
            journaling: false,
            journal_threshold_bytes: 0,
        }
    }
}

/// Per-block bookkeeping written immediately before each allocation.
#[repr(C)]
struct BlockHeader {
    magic: u32,
    _reserved: u32,
    payload_size: usize,
    alignment: usize,
    pre_canary: usize,
    post_canary: usize,
}

/// Header slot size: the header itself, kept at max natural alignment.
const HEADER_BYTES: usize = align_up(core::mem::size_of::<BlockHeader>(), MIN_ALIGN);

/// Result of a corruption scan over all live blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaScanReport {
    pub chunks_scanned: usize,
    pub blocks_scanned: usize,
    pub magic_mismatches: usize,
    pub canary_violations: usize,
}

impl ArenaScanReport {
    pub fn is_ok(&self) -> bool {
        self.magic_mismatches == 0 && self.canary_violations == 0
    }
}

pub struct ArenaAllocator {
    opts: ArenaOptions,
    chunks: Vec<ArenaChunk>,
    next_chunk_bytes: usize,
    total_bytes: usize,
    group: Option<Arc<ArenaGroup>>,
    journal: JournalRing,
}

// Single-owner: an arena may move between threads but is never shared.
unsafe impl Send for ArenaAllocator {}

impl ArenaAllocator {
    pub fn new(opts: ArenaOptions) -> Self {
        let mut arena = ArenaAllocator {
            next_chunk_bytes: opts.initial_chunk_size.max(MIN_CHUNK_BYTES),
            opts,
            chunks: Vec::new(),
            total_bytes: 0,
            group: None,
            journal: JournalRing::new(),
        };
        let first = arena.new_chunk(0);
        arena.chunks.push(first);
        arena
    }

    /// Route future chunk acquisition and release through a shared recycler.
    pub fn attach_group(&mut self, group: Arc<ArenaGroup>) {
        self.group = Some(group);
    }

    pub fn options(&self) -> &ArenaOptions {
        &self.opts
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes still available in the current carve chunk.
    pub fn bytes_remaining(&self) -> usize {
        self.chunks.last().map_or(0, ArenaChunk::bytes_remaining)
    }

    /// Payload bytes served since construction or the last reset.
    pub fn total_allocated(&self) -> usize {
        self.total_bytes
    }

    /// Bump-allocate `bytes` aligned to `alignment`.
    ///
    /// Zero bytes are treated as one so every allocation has a distinct
    /// address. Alignment is raised to at least the platform maximum
    /// natural alignment and rounded up to a power of two. The returned
    /// pointer stays valid until `reset` or `release`.
    pub fn allocate(&mut self, bytes: usize, alignment: usize) -> NonNull<u8> {
        let bytes = bytes.max(1);
        let alignment = Self::normalize_align(alignment);

        if let Some(last) = self.chunks.last_mut() {
            if let Some(ptr) = Self::try_alloc_from_chunk(&self.opts, last, bytes, alignment) {
                self.total_bytes += bytes;
                self.maybe_journal(bytes, alignment);
                // Carve guarantees a non-null interior pointer.
                return unsafe { NonNull::new_unchecked(ptr) };
            }
        }
        self.allocate_slow(bytes, alignment)
    }

    /// Allocate storage for a `T` and move `value` into it.
    ///
    /// The arena never runs destructors; `value` is dropped only if the
    /// caller later invokes `drop_in_place` themselves.
    pub fn construct<T>(&mut self, value: T) -> NonNull<T> {
        let raw = self
            .allocate(core::mem::size_of::<T>(), core::mem::align_of::<T>())
            .cast::<T>();
        unsafe {
            raw.as_ptr().write(value);
        }
        raw
    }

    /// Rewind every chunk's cursor to zero, keeping the storage.
    pub fn reset(&mut self) {
        for c in &mut self.chunks {
            c.offset = 0;
        }
        self.total_bytes = 0;
        // Journal is left intact across resets.
    }

    /// Return all chunks to the attached group (or the OS) and restore the
    /// growth schedule to its initial state.
    pub fn release(&mut self) {
        if let Some(group) = &self.group {
            for chunk in self.chunks.drain(..) {
                group.release(chunk);
            }
        } else {
            for mut chunk in self.chunks.drain(..) {
                os_free_chunk(&mut chunk);
            }
        }
        self.total_bytes = 0;
        self.next_chunk_bytes = self.opts.initial_chunk_size.max(MIN_CHUNK_BYTES);
    }

    /// Snapshot of the allocation journal, oldest entry first.
    pub fn journal_snapshot(&self) -> Vec<JournalEntry> {
        self.journal.snapshot()
    }

    /// Walk every block header in every chunk, validating magic tags and
    /// canary redzones. The arena never checks canaries on its own (it
    /// frees nothing individually); this is the offline scanning hook.
    pub fn scan_corruption(&self) -> ArenaScanReport {
        let mut report = ArenaScanReport::default();
        for c in &self.chunks {
            report.chunks_scanned += 1;
            self.scan_chunk(c, &mut report);
        }
        if !report.is_ok() {
            tracing::warn!(
                target: "hotalloc::arena",
                magic_mismatches = report.magic_mismatches,
                canary_violations = report.canary_violations,
                "corruption scan found damaged blocks"
            );
        }
        report
    }

    fn scan_chunk(&self, c: &ArenaChunk, report: &mut ArenaScanReport) {
        let base = c.base as usize;
        let end = base + c.offset;
        // Mirror the carve layout on absolute addresses so alignments
        // larger than the chunk base alignment walk identically.
        let mut cur = base;
        while cur < end {
            let hdr_addr = align_up(cur, MIN_ALIGN);
            if hdr_addr + HEADER_BYTES > end {
                break;
            }
            let hdr = unsafe { &*(hdr_addr as *const BlockHeader) };
            if hdr.magic != BLOCK_MAGIC {
                report.magic_mismatches += 1;
                // The walk cannot continue past a damaged header.
                break;
            }
            report.blocks_scanned += 1;

            let user = align_up(hdr_addr + HEADER_BYTES + hdr.pre_canary, hdr.alignment.max(1));
            let pre_start = (user - hdr.pre_canary) as *const u8;
            let post_start = (user + hdr.payload_size) as *const u8;
            unsafe {
                for i in 0..hdr.pre_canary {
                    if pre_start.add(i).read() != self.opts.canary_byte {
                        report.canary_violations += 1;
                        break;
                    }
                }
                for i in 0..hdr.post_canary {
                    if post_start.add(i).read() != self.opts.canary_byte {
                        report.canary_violations += 1;
                        break;
                    }
                }
            }
            cur = user + hdr.payload_size + hdr.post_canary;
        }
    }

    // ---- private ----

    fn normalize_align(alignment: usize) -> usize {
        let a = alignment.max(MIN_ALIGN);
        if a.is_power_of_two() {
            a
        } else {
            a.next_power_of_two()
        }
    }

    /// Carve one block out of `c`. Layout within the chunk:
    /// `[header @16] [pre canary] [align slack] [payload @alignment] [post canary]`.
    fn try_alloc_from_chunk(
        opts: &ArenaOptions,
        c: &mut ArenaChunk,
        user_size: usize,
        alignment: usize,
    ) -> Option<*mut u8> {
        let base = c.base as usize;
        let cur = base + c.offset;

        let hdr_addr = align_up(cur, MIN_ALIGN);
        let hdr_end = hdr_addr + HEADER_BYTES;

        let pre = if opts.use_canaries { opts.canary_size } else { 0 };
        let post = if opts.use_canaries { opts.canary_size } else { 0 };

        let user_addr = align_up(hdr_end + pre, alignment);
        let end = user_addr + user_size + post;
        if end > base + c.size {
            return None;
        }

        unsafe {
            let hdr = hdr_addr as *mut BlockHeader;
            hdr.write(BlockHeader {
                magic: BLOCK_MAGIC,
                _reserved: 0,
                payload_size: user_size,
                alignment,
                pre_canary: pre,
                post_canary: post,
            });

            let user = user_addr as *mut u8;
            if pre > 0 {
                core::ptr::write_bytes(user.sub(pre), opts.canary_byte, pre);
            }
            if post > 0 {
                core::ptr::write_bytes(user.add(user_size), opts.canary_byte, post);
            }

            c.offset = end - base;
            Some(user)
        }
    }

    #[cold]
    fn allocate_slow(&mut self, size: usize, alignment: usize) -> NonNull<u8> {
        // Worst case within a fresh chunk: header slot, pre canary,
        // alignment slack, payload, post canary.
        let canary = if self.opts.use_canaries {
            self.opts.canary_size
        } else {
            0
        };
        let worst = HEADER_BYTES + canary + alignment + size + canary;

        let floor = self.opts.initial_chunk_size.max(worst);
        let ceil = self.opts.max_chunk_size.max(floor);
        let want = self.next_chunk_bytes.max(worst).clamp(floor, ceil);

        tracing::debug!(
            target: "hotalloc::arena",
            want,
            chunks = self.chunks.len(),
            "growing arena"
        );
        let fresh = self.new_chunk(want);
        self.chunks.push(fresh);

        // Advance the growth schedule for next time.
        let g = if self.opts.growth_factor > 1.0 {
            self.opts.growth_factor
        } else {
            2.0
        };
        let next = ((want as f64) * g) as usize;
        self.next_chunk_bytes = next.clamp(floor, ceil).max(worst);

        let last = self.chunks.last_mut().unwrap();
        if let Some(ptr) = Self::try_alloc_from_chunk(&self.opts, last, size, alignment) {
            self.total_bytes += size;
            self.maybe_journal(size, alignment);
            return unsafe { NonNull::new_unchecked(ptr) };
        }

        // Pathological alignment + size: an exact-fit chunk must succeed.
        let exact = self.new_chunk(worst);
        self.chunks.push(exact);
        let last = self.chunks.last_mut().unwrap();
        match Self::try_alloc_from_chunk(&self.opts, last, size, alignment) {
            Some(ptr) => {
                self.total_bytes += size;
                self.maybe_journal(size, alignment);
                unsafe { NonNull::new_unchecked(ptr) }
            }
            None => abort_with_message("arena could not satisfy allocation from exact-fit chunk"),
        }
    }

    fn new_chunk(&mut self, min_bytes: usize) -> ArenaChunk {
        let want = min_bytes.max(self.next_chunk_bytes.max(MIN_CHUNK_BYTES));
        match &self.group {
            Some(group) => group.acquire(want, self.opts.guard_pages, self.opts.prefer_huge),
            None => os_alloc_chunk(want, self.opts.guard_pages, self.opts.prefer_huge),
        }
    }

    fn maybe_journal(&mut self, size: usize, alignment: usize) {
        if !self.opts.journaling || size < self.opts.journal_threshold_bytes {
            return;
        }
        self.journal.record(size, alignment);
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        self.release();
    }
}

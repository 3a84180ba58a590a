//! Arena chunks and the OS-facing chunk alloc/free pair.

use crate::platform;
use crate::util::{abort_with_message, align_up, MIN_CHUNK_BYTES};
use core::ptr;

/// A contiguous range of backing memory owned by one arena (or cached in an
/// `ArenaGroup`) at a time. The usable range is `[base, base + size)`;
/// `mapped_base`/`mapped_size` cover the whole mapping including guard pages.
pub struct ArenaChunk {
    pub(crate) base: *mut u8,
    pub(crate) size: usize,
    pub(crate) offset: usize,
    mapped_base: *mut u8,
    mapped_size: usize,
    pub(crate) guard_pages: bool,
    pub(crate) huge: bool,
}

// Chunks move between arenas and the shared recycler; the raw pointers are
// exclusively owned by whichever holds the chunk value.
unsafe impl Send for ArenaChunk {}

impl ArenaChunk {
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn bytes_remaining(&self) -> usize {
        self.size - self.offset
    }
}

/// Map a fresh chunk of at least `usable_bytes` usable bytes.
///
/// `guards` brackets the usable range with one `PROT_NONE` page on each
/// side; `prefer_huge` asks the kernel for transparent huge pages. Both are
/// advisory on hosts that cannot honor them.
///
/// The arena has no null-return contract, so running out of backing memory
/// is fatal here.
pub fn os_alloc_chunk(usable_bytes: usize, guards: bool, prefer_huge: bool) -> ArenaChunk {
    let page = platform::page_size();
    let usable = align_up(usable_bytes.max(MIN_CHUNK_BYTES), page);
    let mapped_size = if guards { usable + 2 * page } else { usable };

    unsafe {
        let mapped_base = platform::map_anonymous(mapped_size);
        if mapped_base.is_null() {
            abort_with_message("chunk source exhausted: anonymous mapping failed");
        }

        let base = if guards {
            platform::protect_none(mapped_base, page);
            platform::protect_none(mapped_base.add(page + usable), page);
            mapped_base.add(page)
        } else {
            mapped_base
        };

        if prefer_huge {
            platform::advise_huge(base, usable);
        }

        ArenaChunk {
            base,
            size: usable,
            offset: 0,
            mapped_base,
            mapped_size,
            guard_pages: guards,
            huge: prefer_huge,
        }
    }
}

/// Return a chunk's mapping to the OS and clear it.
pub fn os_free_chunk(c: &mut ArenaChunk) {
    if c.mapped_base.is_null() {
        return;
    }
    unsafe {
        platform::unmap(c.mapped_base, c.mapped_size);
    }
    c.base = ptr::null_mut();
    c.mapped_base = ptr::null_mut();
    c.size = 0;
    c.offset = 0;
    c.mapped_size = 0;
}

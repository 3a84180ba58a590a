//! Environment overrides for thread-local allocator defaults.
//!
//! Explicitly constructed allocators take their knobs from `ArenaOptions` /
//! `PoolOptions`; the thread-local wrappers built with default options also
//! honor these variables so deployments can retune without a rebuild:
//!
//! - `HOTALLOC_INITIAL_CHUNK` — arena initial chunk size in bytes
//! - `HOTALLOC_MAX_CHUNK` — arena chunk size cap in bytes
//! - `HOTALLOC_QUARANTINE` — pool quarantine bound in slots

use crate::arena::ArenaOptions;
use crate::pool::PoolOptions;

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Arena defaults with environment overrides applied.
pub fn default_arena_options() -> ArenaOptions {
    let mut opts = ArenaOptions::default();
    if let Some(v) = env_usize("HOTALLOC_INITIAL_CHUNK") {
        opts.initial_chunk_size = v;
    }
    if let Some(v) = env_usize("HOTALLOC_MAX_CHUNK") {
        opts.max_chunk_size = v.max(opts.initial_chunk_size);
    }
    opts
}

/// Pool defaults with environment overrides applied.
pub fn default_pool_options() -> PoolOptions {
    let mut opts = PoolOptions::default();
    if let Some(v) = env_usize("HOTALLOC_QUARANTINE") {
        opts.quarantine_size = v;
    }
    opts
}

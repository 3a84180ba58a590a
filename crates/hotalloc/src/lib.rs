//! Custom allocators for latency-sensitive hot paths.
//!
//! Two engines and the machinery around them:
//!
//! - [`ArenaAllocator`]: bump allocation over a growing chunk list, with
//!   per-block headers, canary redzones, bulk [`reset`](ArenaAllocator::reset)
//!   / [`release`](ArenaAllocator::release), and an optional shared
//!   [`ArenaGroup`] recycler for released chunks.
//! - [`PoolAllocator`] / [`LockFreePoolAllocator`]: fixed-size object pools
//!   with debug hygiene (zero-on-alloc, poison-on-free, verify-on-alloc,
//!   quarantine) and atomic occupancy metrics. The lock-free variant keeps
//!   free-list links in a side table so poisoning never corrupts the list.
//! - [`SizeClassPool`]: routes variable-size requests to power-of-two
//!   classes of fixed pools.
//! - [`ThreadLocalArena`] / [`ThreadLocalPool`]: per-thread instances for
//!   contention-free common paths.

pub mod arena;
pub mod config;
pub mod construct;
pub mod histogram;
pub mod platform;
pub mod pool;
pub mod tls;
pub mod util;

pub use arena::{ArenaAllocator, ArenaGroup, ArenaOptions, ArenaScanReport, GroupStats};
pub use construct::{construct_in, destroy_in, RawAlloc};
pub use histogram::{Histogram, HistogramSnapshot};
pub use pool::{
    FixedPool, LockFreePoolAllocator, LockFreeSizeClassPool, PoolAllocator, PoolHook, PoolOptions,
    PoolStats, SizeClassPool,
};
pub use tls::{ThreadLocalArena, ThreadLocalPool};

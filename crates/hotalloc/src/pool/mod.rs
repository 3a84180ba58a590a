//! Fixed-size object pools: single-threaded, lock-free, and a size-class
//! dispatcher in front of either.

pub mod fixed;
pub mod lockfree;
pub mod options;
pub(crate) mod quarantine;
pub mod size_class;
pub mod stats;

pub use fixed::PoolAllocator;
pub use lockfree::LockFreePoolAllocator;
pub use options::{PoolHook, PoolOptions};
pub use size_class::{FixedPool, LockFreeSizeClassPool, SizeClassPool};
pub use stats::PoolStats;

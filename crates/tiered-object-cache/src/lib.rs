//! Two-tier object cache: a cost-bounded in-memory LRU tier backed by a
//! file-per-key disk tier, with read-through promotion between them.
//!
//! Items implement [`CacheItem`] (serialize, deserialize, report a cost);
//! the cache treats them as opaque. The cache is advisory: no operation
//! returns an error — absence and failure both surface as "no value", with
//! diagnostics going to `tracing`.

mod cache;
mod disk;
mod error;
mod item;
mod memory;
mod types;

pub use cache::TieredCache;
pub use disk::DiskTier;
pub use error::StoreError;
pub use item::CacheItem;
pub use memory::MemoryTier;
pub use types::{
    CacheConfig, CacheStats, DiskConfig, IntoCacheKey, MemoryConfig, TierKind, TierSet,
};

//! Shared cache types: tier selection, keys, configuration, statistics

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// The storage tiers a cache can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierKind {
    Memory,
    Disk,
}

/// A subset of tiers an operation applies to.
///
/// Every orchestrator operation takes one of these; the default is
/// [`TierSet::ALL`], covering every tier the cache was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSet {
    memory: bool,
    disk: bool,
}

impl TierSet {
    pub const ALL: TierSet = TierSet {
        memory: true,
        disk: true,
    };
    pub const MEMORY: TierSet = TierSet {
        memory: true,
        disk: false,
    };
    pub const DISK: TierSet = TierSet {
        memory: false,
        disk: true,
    };

    pub fn contains(&self, kind: TierKind) -> bool {
        match kind {
            TierKind::Memory => self.memory,
            TierKind::Disk => self.disk,
        }
    }
}

impl Default for TierSet {
    fn default() -> Self {
        TierSet::ALL
    }
}

impl From<TierKind> for TierSet {
    fn from(kind: TierKind) -> Self {
        match kind {
            TierKind::Memory => TierSet::MEMORY,
            TierKind::Disk => TierSet::DISK,
        }
    }
}

/// Anything usable as a cache key: plain strings, or URLs canonicalized
/// to their serialized string form before reaching either tier.
pub trait IntoCacheKey {
    fn into_cache_key(self) -> String;
}

impl IntoCacheKey for String {
    fn into_cache_key(self) -> String {
        self
    }
}

impl IntoCacheKey for &str {
    fn into_cache_key(self) -> String {
        self.to_string()
    }
}

impl IntoCacheKey for &Url {
    fn into_cache_key(self) -> String {
        self.as_str().to_string()
    }
}

impl IntoCacheKey for Url {
    fn into_cache_key(self) -> String {
        String::from(self)
    }
}

/// Memory tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum aggregate cost; `0` means unbounded.
    pub cost_limit: u64,
}

/// Disk tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Cache root; the tier's directory is `<root>/<cache name>`.
    pub root: PathBuf,
    /// Maximum aggregate on-disk size in bytes; `0` means unbounded.
    pub cost_limit: u64,
    /// Entries older than this are purged; `Duration::ZERO` disables the check.
    pub max_staleness: Duration,
}

/// Construction-time configuration for a [`TieredCache`](crate::TieredCache).
///
/// Omitting a tier disables it entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub memory: Option<MemoryConfig>,
    pub disk: Option<DiskConfig>,
}

/// Point-in-time statistics for one tier or a merged tier set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_cost: u64,
    pub cost_limit: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub(crate) fn merge(&mut self, other: &CacheStats) {
        self.entries += other.entries;
        self.total_cost += other.total_cost;
        self.cost_limit += other.cost_limit;
        self.hits += other.hits;
        self.misses += other.misses;
    }
}

//! The orchestrator composing the memory and disk tiers
//!
//! Reads check memory first and fall back to disk; a disk hit is promoted
//! into memory before being returned, so repeatedly-read persistent items
//! stay available at memory speed. Writes fan out to every selected tier
//! independently; no cross-tier atomicity is implied.

use crate::disk::DiskTier;
use crate::item::CacheItem;
use crate::memory::MemoryTier;
use crate::types::{CacheConfig, CacheStats, IntoCacheKey, TierKind, TierSet};
use std::sync::Arc;
use tracing::debug;

/// A named two-tier cache. Tiers omitted from the configuration are
/// disabled; operations addressed to a disabled tier are silent no-ops.
pub struct TieredCache<I> {
    memory: Option<MemoryTier<I>>,
    disk: Option<DiskTier<I>>,
}

impl<I: CacheItem> TieredCache<I> {
    /// Build the configured tiers. The disk tier's directory is
    /// `<config.disk.root>/<name>`; two caches must not share one.
    ///
    /// Must be called from within a Tokio runtime when a disk tier is
    /// configured (its background size scan is spawned here).
    pub async fn new(name: &str, config: CacheConfig) -> Self {
        let memory = config.memory.map(MemoryTier::new);
        let disk = match config.disk {
            Some(disk_config) => Some(DiskTier::new(name, disk_config).await),
            None => None,
        };
        Self { memory, disk }
    }

    fn memory_in(&self, tiers: TierSet) -> Option<&MemoryTier<I>> {
        self.memory
            .as_ref()
            .filter(|_| tiers.contains(TierKind::Memory))
    }

    fn disk_in(&self, tiers: TierSet) -> Option<&DiskTier<I>> {
        self.disk.as_ref().filter(|_| tiers.contains(TierKind::Disk))
    }

    /// Store `value` under `key` in every selected tier, or remove the key
    /// with `None`. Each tier persists and evicts independently.
    pub async fn set(&self, value: Option<Arc<I>>, key: impl IntoCacheKey, tiers: TierSet) {
        let key = key.into_cache_key();
        if let Some(memory) = self.memory_in(tiers) {
            memory.set(&key, value.clone()).await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            disk.set(&key, value.as_deref()).await;
        }
    }

    /// Look up `key`: memory first, then disk. A disk hit is written into
    /// the memory tier (subject to its own cost accounting) before being
    /// returned.
    pub async fn get(&self, key: impl IntoCacheKey) -> Option<Arc<I>> {
        let key = key.into_cache_key();

        if let Some(memory) = &self.memory {
            if let Some(value) = memory.get(&key).await {
                return Some(value);
            }
        }

        let disk = self.disk.as_ref()?;
        let value = Arc::new(disk.get(&key).await?);
        if let Some(memory) = &self.memory {
            memory.set(&key, Some(Arc::clone(&value))).await;
            debug!(key = %key, "promoted disk entry to memory");
        }
        Some(value)
    }

    /// True if any selected tier holds `key`. Does not affect recency.
    pub async fn contains(&self, key: impl IntoCacheKey, tiers: TierSet) -> bool {
        let key = key.into_cache_key();
        if let Some(memory) = self.memory_in(tiers) {
            if memory.contains(&key).await {
                return true;
            }
        }
        if let Some(disk) = self.disk_in(tiers) {
            if disk.contains(&key).await {
                return true;
            }
        }
        false
    }

    /// Replace the cost ceiling on every selected tier (`0` = unbounded).
    pub async fn update_cost_limit(&self, cost_limit: u64, tiers: TierSet) {
        if let Some(memory) = self.memory_in(tiers) {
            memory.update_cost_limit(cost_limit).await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            disk.update_cost_limit(cost_limit).await;
        }
    }

    /// Run an eviction pass on every selected tier.
    pub async fn purge(&self, tiers: TierSet) {
        if let Some(memory) = self.memory_in(tiers) {
            memory.purge().await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            disk.purge().await;
        }
    }

    /// Sweep entries no longer owned outside the cache. Only the memory
    /// tier has a liveness concept; the disk tier ignores this.
    pub async fn purge_unowned(&self, tiers: TierSet) {
        if let Some(memory) = self.memory_in(tiers) {
            memory.purge_unowned().await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            disk.purge_unowned().await;
        }
    }

    /// Drop every entry in every selected tier.
    pub async fn clear(&self, tiers: TierSet) {
        if let Some(memory) = self.memory_in(tiers) {
            memory.clear().await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            disk.clear().await;
        }
    }

    /// Aggregate cost across the selected tiers.
    pub async fn total_cost(&self, tiers: TierSet) -> u64 {
        let mut total = 0;
        if let Some(memory) = self.memory_in(tiers) {
            total += memory.total_cost().await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            total += disk.total_cost().await;
        }
        total
    }

    /// Summed cost limits across the selected tiers.
    pub async fn cost_limit(&self, tiers: TierSet) -> u64 {
        let mut limit = 0;
        if let Some(memory) = self.memory_in(tiers) {
            limit += memory.cost_limit().await;
        }
        if let Some(disk) = self.disk_in(tiers) {
            limit += disk.cost_limit().await;
        }
        limit
    }

    /// Merged statistics across the selected tiers.
    pub async fn stats(&self, tiers: TierSet) -> CacheStats {
        let mut stats = CacheStats::default();
        if let Some(memory) = self.memory_in(tiers) {
            stats.merge(&memory.stats().await);
        }
        if let Some(disk) = self.disk_in(tiers) {
            stats.merge(&disk.stats().await);
        }
        stats
    }
}

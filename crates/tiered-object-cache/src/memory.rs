//! In-memory cache tier with cost-bounded LRU eviction and an unowned sweep

use crate::item::CacheItem;
use crate::types::{CacheStats, MemoryConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::debug;

struct MemoryEntry<I> {
    value: Arc<I>,
    cost: u64,
    last_access: u64,
}

struct MemoryState<I> {
    entries: HashMap<String, MemoryEntry<I>>,
    total_cost: u64,
    cost_limit: u64,
    /// Logical clock; bumped on every insert and successful read so LRU
    /// ordering is deterministic regardless of wall-clock granularity.
    clock: u64,
}

/// The memory tier: a mutex-guarded map of shared item references with a
/// running aggregate cost.
///
/// Values are handed out as `Arc` clones, so the tier and its callers share
/// ownership. [`MemoryTier::purge_unowned`] exploits exactly that: entries
/// whose only remaining owner is the tier itself are dropped.
pub struct MemoryTier<I> {
    state: Mutex<MemoryState<I>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<I: CacheItem> MemoryTier<I> {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: HashMap::new(),
                total_cost: 0,
                cost_limit: config.cost_limit,
                clock: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Insert, replace, or (with `None`) remove the entry for `key`, then run
    /// an eviction pass. Never fails.
    pub async fn set(&self, key: &str, value: Option<Arc<I>>) {
        let mut state = self.state.lock().await;

        if let Some(old) = state.entries.remove(key) {
            state.total_cost -= old.cost;
        }

        if let Some(value) = value {
            let cost = value.cost();
            state.clock += 1;
            let last_access = state.clock;
            state.entries.insert(
                key.to_string(),
                MemoryEntry {
                    value,
                    cost,
                    last_access,
                },
            );
            state.total_cost += cost;
            debug!(key, cost, total_cost = state.total_cost, "memory set");
        }

        Self::evict_over_limit(&mut state);
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub async fn get(&self, key: &str) -> Option<Arc<I>> {
        let mut state = self.state.lock().await;
        state.clock += 1;
        let now = state.clock;

        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Presence check; does not affect access order or hit/miss counters.
    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    /// Replace the cost ceiling (`0` = unbounded), then sweep unowned entries
    /// and run an eviction pass so a lowered limit takes effect immediately.
    pub async fn update_cost_limit(&self, cost_limit: u64) {
        let mut state = self.state.lock().await;
        state.cost_limit = cost_limit;
        Self::sweep_unowned(&mut state);
        Self::evict_over_limit(&mut state);
    }

    /// Drop every entry whose value is no longer owned by anyone but the
    /// tier itself.
    pub async fn purge_unowned(&self) {
        let mut state = self.state.lock().await;
        Self::sweep_unowned(&mut state);
    }

    /// Run an LRU eviction pass against the current cost limit.
    pub async fn purge(&self) {
        let mut state = self.state.lock().await;
        Self::evict_over_limit(&mut state);
    }

    /// Drop all entries and reset the aggregate cost to zero.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.total_cost = 0;
        debug!("memory tier cleared");
    }

    pub async fn total_cost(&self) -> u64 {
        self.state.lock().await.total_cost
    }

    pub async fn cost_limit(&self) -> u64 {
        self.state.lock().await.cost_limit
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            total_cost: state.total_cost,
            cost_limit: state.cost_limit,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Evict least-recently-used entries while the aggregate cost exceeds the
    /// limit. A limit of `0` disables eviction; a total exactly at the limit
    /// is retained.
    fn evict_over_limit(state: &mut MemoryState<I>) {
        if state.cost_limit == 0 || state.total_cost <= state.cost_limit {
            return;
        }

        let mut by_age: Vec<(String, u64)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_access))
            .collect();
        by_age.sort_by_key(|(_, last_access)| *last_access);

        for (key, _) in by_age {
            if state.total_cost <= state.cost_limit {
                break;
            }
            if let Some(entry) = state.entries.remove(&key) {
                state.total_cost -= entry.cost;
                debug!(key = %key, cost = entry.cost, "memory eviction");
            }
        }
    }

    /// Rebuild the map keeping only entries some other owner still holds.
    ///
    /// Each value is observed through a `Weak` that does not extend its
    /// lifetime, the owning map is dropped, and survivors are re-inserted.
    /// Runs entirely under the tier lock, so callers never see a partial map.
    fn sweep_unowned(state: &mut MemoryState<I>) {
        let observed: Vec<(String, Weak<I>, u64, u64)> = state
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    Arc::downgrade(&entry.value),
                    entry.cost,
                    entry.last_access,
                )
            })
            .collect();

        // Dropping the map releases the tier's strong references; values
        // with no external owner are deallocated here.
        state.entries = HashMap::new();

        let mut total_cost = 0u64;
        for (key, weak, cost, last_access) in observed {
            if let Some(value) = weak.upgrade() {
                total_cost += cost;
                state.entries.insert(
                    key,
                    MemoryEntry {
                        value,
                        cost,
                        last_access,
                    },
                );
            } else {
                debug!(key = %key, cost, "dropped unowned entry");
            }
        }
        state.total_cost = total_cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(cost_limit: u64) -> MemoryTier<Vec<u8>> {
        MemoryTier::new(MemoryConfig { cost_limit })
    }

    fn blob(cost: usize) -> Arc<Vec<u8>> {
        Arc::new(vec![0u8; cost])
    }

    #[tokio::test]
    async fn test_cost_conservation() {
        let tier = tier(0);
        tier.set("a", Some(blob(100))).await;
        tier.set("b", Some(blob(200))).await;
        assert_eq!(tier.total_cost().await, 300);

        tier.set("a", None).await;
        assert_eq!(tier.total_cost().await, 200);

        tier.set("b", None).await;
        assert_eq!(tier.total_cost().await, 0);
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_cost_by_difference() {
        let tier = tier(0);
        tier.set("k", Some(blob(1000))).await;
        tier.set("k", Some(blob(300))).await;
        assert_eq!(tier.total_cost().await, 300);
        assert_eq!(tier.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let tier = tier(2);
        tier.set("a", Some(blob(1))).await;
        tier.set("b", Some(blob(1))).await;

        // Refresh "a" so "b" becomes the oldest.
        assert!(tier.get("a").await.is_some());

        tier.set("c", Some(blob(1))).await;
        assert!(tier.get("a").await.is_some());
        assert!(tier.get("b").await.is_none());
        assert!(tier.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_contains_does_not_refresh_recency() {
        let tier = tier(2);
        tier.set("a", Some(blob(1))).await;
        tier.set("b", Some(blob(1))).await;

        assert!(tier.contains("a").await);

        // "a" is still the oldest entry and should be the one evicted.
        tier.set("c", Some(blob(1))).await;
        assert!(!tier.contains("a").await);
        assert!(tier.contains("b").await);
        assert!(tier.contains("c").await);
    }

    #[tokio::test]
    async fn test_purge_keeps_total_at_exact_limit() {
        let tier = tier(200);
        tier.set("a", Some(blob(100))).await;
        tier.set("b", Some(blob(100))).await;
        tier.purge().await;
        assert_eq!(tier.total_cost().await, 200);
        assert_eq!(tier.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_lowering_limit_evicts_immediately() {
        let tier = tier(0);
        // Hold strong references so the unowned sweep that precedes the
        // eviction pass retains both entries; only LRU order decides.
        let a = blob(100);
        let b = blob(100);
        tier.set("a", Some(Arc::clone(&a))).await;
        tier.set("b", Some(Arc::clone(&b))).await;

        tier.update_cost_limit(100).await;
        assert_eq!(tier.total_cost().await, 100);
        assert!(!tier.contains("a").await);
        assert!(tier.contains("b").await);
    }

    #[tokio::test]
    async fn test_limit_update_sweeps_unowned_first() {
        let tier = tier(0);
        tier.set("orphan", Some(blob(100))).await;
        let held = blob(100);
        tier.set("held", Some(Arc::clone(&held))).await;

        tier.update_cost_limit(100).await;
        assert!(!tier.contains("orphan").await);
        assert!(tier.contains("held").await);
        assert_eq!(tier.total_cost().await, 100);
    }

    #[tokio::test]
    async fn test_zero_limit_is_unbounded() {
        let tier = tier(0);
        for i in 0..50 {
            tier.set(&format!("k{}", i), Some(blob(1000))).await;
        }
        tier.purge().await;
        assert_eq!(tier.stats().await.entries, 50);
        assert_eq!(tier.total_cost().await, 50_000);
    }

    #[tokio::test]
    async fn test_unowned_sweep_keeps_externally_owned() {
        let tier = tier(0);
        let kept = blob(100);
        tier.set("kept", Some(Arc::clone(&kept))).await;
        tier.set("orphan", Some(blob(200))).await;

        tier.purge_unowned().await;

        assert!(tier.contains("kept").await);
        assert!(!tier.contains("orphan").await);
        assert_eq!(tier.total_cost().await, 100);
    }

    #[tokio::test]
    async fn test_unowned_sweep_after_caller_drops() {
        let tier = tier(0);
        let held = blob(10);
        tier.set("x", Some(Arc::clone(&held))).await;

        tier.purge_unowned().await;
        assert!(tier.contains("x").await);

        drop(held);
        tier.purge_unowned().await;
        assert!(!tier.contains("x").await);
        assert_eq!(tier.total_cost().await, 0);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let tier = tier(0);
        tier.clear().await;
        assert_eq!(tier.total_cost().await, 0);

        tier.set("a", Some(blob(10))).await;
        tier.clear().await;
        tier.clear().await;
        assert_eq!(tier.total_cost().await, 0);
        assert_eq!(tier.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_hit_miss_counters() {
        let tier = tier(0);
        assert!(tier.get("missing").await.is_none());
        tier.set("k", Some(blob(1))).await;
        assert!(tier.get("k").await.is_some());

        let stats = tier.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_lru_scenario() {
        let tier = tier(2500);
        tier.set("item0", Some(blob(1000))).await;
        tier.set("item1", Some(blob(1000))).await;
        assert!(tier.get("item0").await.is_some());
        tier.set("item2", Some(blob(1000))).await;

        assert!(tier.get("item0").await.is_some());
        assert!(tier.get("item1").await.is_none());
        assert!(tier.get("item2").await.is_some());
        assert_eq!(tier.total_cost().await, 2000);
    }
}

//! Read-mostly model catalog cache.
//!
//! One snapshot per provider, swapped atomically on refresh so readers
//! never see a partially updated catalog. Staleness is tracked per
//! snapshot; the refresh lifecycle (who fetches new lists) lives with the
//! process wiring, not here.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Immutable catalog snapshot for one provider
#[derive(Debug)]
pub struct CatalogSnapshot {
    /// Model ids the provider serves
    pub models: HashSet<String>,
    /// When the snapshot was taken
    pub fetched_at: Instant,
}

impl CatalogSnapshot {
    fn new(models: impl IntoIterator<Item = String>) -> Self {
        Self {
            models: models.into_iter().collect(),
            fetched_at: Instant::now(),
        }
    }
}

/// Process-scoped catalog cache, injected where needed so tests can
/// substitute fakes.
pub struct CatalogCache {
    entries: DashMap<String, ArcSwap<CatalogSnapshot>>,
    ttl: Duration,
}

impl CatalogCache {
    /// Create an empty cache with the given snapshot TTL
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Install or replace a provider's catalog snapshot atomically
    pub fn set_models(&self, provider: &str, models: impl IntoIterator<Item = String>) {
        let snapshot = Arc::new(CatalogSnapshot::new(models));
        match self.entries.get(provider) {
            Some(slot) => slot.store(snapshot),
            None => {
                self.entries
                    .insert(provider.to_string(), ArcSwap::new(snapshot));
            }
        }
    }

    /// Current snapshot for a provider, if one was ever installed
    #[must_use]
    pub fn snapshot(&self, provider: &str) -> Option<Arc<CatalogSnapshot>> {
        self.entries.get(provider).map(|slot| slot.load_full())
    }

    /// Whether the provider's catalog lists the model
    #[must_use]
    pub fn contains(&self, provider: &str, model: &str) -> bool {
        self.snapshot(provider)
            .is_some_and(|snap| snap.models.contains(model))
    }

    /// Whether a snapshot is missing or older than the TTL
    #[must_use]
    pub fn is_stale(&self, provider: &str) -> bool {
        self.snapshot(provider)
            .map_or(true, |snap| snap.fetched_at.elapsed() > self.ttl)
    }

    /// Providers with an installed snapshot
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Union of all catalog model ids, for the `/v1/models` listing
    #[must_use]
    pub fn all_models(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            for model in &entry.value().load().models {
                seen.insert(model.clone());
            }
        }
        let mut models: Vec<String> = seen.into_iter().collect();
        models.sort();
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_contains() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.set_models("together", vec!["meta-llama/Llama-3-70b".to_string()]);
        assert!(cache.contains("together", "meta-llama/Llama-3-70b"));
        assert!(!cache.contains("together", "gpt-4o"));
        assert!(!cache.contains("fireworks", "meta-llama/Llama-3-70b"));
    }

    #[test]
    fn test_swap_replaces_snapshot() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.set_models("together", vec!["old-model".to_string()]);
        cache.set_models("together", vec!["new-model".to_string()]);
        assert!(!cache.contains("together", "old-model"));
        assert!(cache.contains("together", "new-model"));
    }

    #[test]
    fn test_staleness() {
        let cache = CatalogCache::new(Duration::from_secs(0));
        assert!(cache.is_stale("together"));
        cache.set_models("together", vec!["m".to_string()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.is_stale("together"));

        let fresh = CatalogCache::new(Duration::from_secs(60));
        fresh.set_models("together", vec!["m".to_string()]);
        assert!(!fresh.is_stale("together"));
    }

    #[test]
    fn test_all_models_dedup_sorted() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.set_models("a", vec!["m2".to_string(), "m1".to_string()]);
        cache.set_models("b", vec!["m1".to_string(), "m3".to_string()]);
        assert_eq!(cache.all_models(), vec!["m1", "m2", "m3"]);
    }
}

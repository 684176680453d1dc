use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent key/value store with a per-entry deadline.
///
/// Expired entries are never returned. They are dropped on the read that finds
/// them and by one periodic sweep over the whole map.
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // re-check under the shard lock: a concurrent set may have refreshed it
            self.entries
                .remove_if(key, |_, entry| entry.is_expired_at(now));
        }

        None
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key, entry);
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0usize;

        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    pub fn start_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let removed = cache.evict_expired();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "swept expired cache entries");
                }
            }
        })
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

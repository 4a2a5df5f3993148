//! In-Memory Cache Module
//!
//! - `ResolutionCache`: the key-value contract the resolver persists through.
//!   Any store works (workspace state, disk, redis) as long as it is
//!   thread-safe; last write wins.
//! - `MemoryResolutionCache`: DashMap-backed implementation with HIT/MISS stats
//! - `TtlCache`: small generic TTL map, used for price bursts

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::types::{canonical_address, AddressResolution};
use crate::utils::constants::TTL_CACHE_SWEEP_EVERY;

// ============================================
// RESOLUTION CACHE CONTRACT
// ============================================

#[async_trait]
pub trait ResolutionCache: Send + Sync {
    /// Snapshot of the stored resolution; may be superseded by a concurrent set
    async fn get(&self, address: &Address) -> Option<Arc<AddressResolution>>;

    async fn set(&self, address: Address, resolution: Arc<AddressResolution>);
}

/// Cache statistics for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

// ============================================
// MEMORY RESOLUTION CACHE
// ============================================

/// Process-local resolution store
#[derive(Clone, Default)]
pub struct MemoryResolutionCache {
    store: Arc<DashMap<Address, CacheEntry<Arc<AddressResolution>>>>,
    /// `None` keeps entries until replaced; staleness is decided by the resolver
    ttl: Option<Duration>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl MemoryResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict entries older than `ttl` on read
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
        }
    }
}

#[async_trait]
impl ResolutionCache for MemoryResolutionCache {
    async fn get(&self, address: &Address) -> Option<Arc<AddressResolution>> {
        let hit = match self.store.get(address) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.value.clone()),
            Some(entry) => {
                drop(entry); // release read lock before removing
                self.store.remove(address);
                None
            }
            None => None,
        };

        match hit {
            Some(resolution) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ CACHE HIT: {}", canonical_address(address));
                Some(resolution)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS: {}", canonical_address(address));
                None
            }
        }
    }

    async fn set(&self, address: Address, resolution: Arc<AddressResolution>) {
        debug!("💾 CACHE SET: {} ({:?})", canonical_address(&address), resolution.summary.mode);
        self.store.insert(address, CacheEntry::new(resolution));
    }
}

// ============================================
// GENERIC TTL CACHE
// ============================================

/// Thread-safe map whose entries expire after a fixed TTL.
/// Expired entries are swept every `TTL_CACHE_SWEEP_EVERY` inserts.
pub struct TtlCache<K, V> {
    store: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    inserts: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: DashMap::new(),
            ttl,
            inserts: AtomicU64::new(0),
        }
    }

    /// Fresh value, or `None` (expired entries are dropped)
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.store.get(key)?;
        if entry.is_expired(Some(self.ttl)) {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.store.insert(key, CacheEntry::new(value));

        let inserted = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if inserted % TTL_CACHE_SWEEP_EVERY == 0 {
            let dropped = self.cleanup_expired();
            if dropped > 0 {
                debug!("🧹 TTL cache swept {} expired entries", dropped);
            }
        }
    }

    /// Remove all expired entries, returns how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired(Some(self.ttl)));
        before.saturating_sub(self.store.len())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

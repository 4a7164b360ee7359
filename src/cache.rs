// Response cache for read endpoints
// Holds the most recent successful response per key and answers whether a fresh copy exists

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

// Stats for the cache, updated lock-free
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub invalidated_count: AtomicUsize,
    pub clear_count: AtomicUsize,
}

// Point-in-time copy of the stats
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub invalidated_count: usize,
    pub clear_count: usize,
}

// Freshness window applied to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Ttl(Duration),
    UntilInvalidated,
}

impl CachePolicy {
    // Builds a policy from an optional TTL in milliseconds; None or 0 disables expiry
    pub fn from_ttl_ms(ttl_ms: Option<u64>) -> Self {
        match ttl_ms {
            Some(ms) if ms > 0 => CachePolicy::Ttl(Duration::from_millis(ms)),
            _ => CachePolicy::UntilInvalidated,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CachePolicy::Ttl(ttl) => Some(*ttl),
            CachePolicy::UntilInvalidated => None,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Ttl(Duration::from_secs(DEFAULT_LIST_TTL_SECONDS))
    }
}

pub const DEFAULT_LIST_TTL_SECONDS: u64 = 30;

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub default_policy: CachePolicy,
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    policy: CachePolicy,
}

impl CacheEntry {
    // An entry exactly ttl old is still fresh
    fn is_stale(&self, now: Instant) -> bool {
        match self.policy {
            CachePolicy::Ttl(ttl) => now.saturating_duration_since(self.stored_at) > ttl,
            CachePolicy::UntilInvalidated => false,
        }
    }
}

pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    // Bumped by every clear(); writers holding an older epoch lost a race with a mutation
    epoch: AtomicU64,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            epoch: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    // Returns the stored value only if present and not stale
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();

        let stale = match self.entries.get(key) {
            Some(entry) if !entry.is_stale(now) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                debug!(key, "cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if stale {
            // Re-check under the shard lock so a fresh value written meanwhile survives
            if self
                .entries
                .remove_if(key, |_, entry| entry.is_stale(now))
                .is_some()
            {
                self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
            }
            debug!(key, "cache entry expired");
        } else {
            debug!(key, "cache miss");
        }

        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
        None
    }

    pub fn set(&self, key: &str, value: Value) {
        self.set_with_policy(key, value, self.config.default_policy);
    }

    pub fn set_with_policy(&self, key: &str, value: Value, policy: CachePolicy) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                policy,
            },
        );
    }

    // Stores only if nothing cleared the cache since `epoch` was read.
    // Returns false when the write was discarded.
    pub fn set_if_current(&self, key: &str, value: Value, policy: CachePolicy, epoch: u64) -> bool {
        if self.epoch() != epoch {
            debug!(key, "discarding response fetched before invalidation");
            return false;
        }
        self.set_with_policy(key, value, policy);
        true
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.invalidated_count.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    // Removes all entries and returns how many were dropped
    pub fn clear(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let count = self.entries.len();
        self.entries.clear();
        self.stats.clear_count.fetch_add(1, Ordering::SeqCst);
        self.stats
            .invalidated_count
            .fetch_add(count, Ordering::SeqCst);
        count
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            invalidated_count: self.stats.invalidated_count.load(Ordering::SeqCst),
            clear_count: self.stats.clear_count.load(Ordering::SeqCst),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// Builds the cache key for a resource query. Object members are sorted and
// nulls dropped, so permuted or partially-unset filters map to the same key.
pub fn cache_key<F: Serialize + ?Sized>(resource: &str, filters: &F) -> String {
    let canonical = match serde_json::to_value(filters) {
        Ok(value) => canonicalize(value),
        // Filters are plain data; a failure here means no usable filter
        Err(_) => Value::Null,
    };

    match canonical {
        Value::Null => resource.to_string(),
        Value::Object(ref map) if map.is_empty() => resource.to_string(),
        other => format!("{}:{}", resource, other),
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(String, Value)> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            members.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (k, v) in members {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

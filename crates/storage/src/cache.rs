//! TTL + LRU cache for resource payloads.
//!
//! Each entry carries a [`CacheStrategy`] that fixes its lifetime and the
//! number of entries the strategy may hold. When a strategy is full, its
//! least-recently-accessed entry is evicted.

use aceflow_core::Time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Caching policy of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Never cached
    NoCache,
    /// 5 minutes, 100 entries
    ShortTerm,
    /// 30 minutes, 200 entries
    MediumTerm,
    /// 2 hours, 50 entries
    LongTerm,
    /// 1 day, 20 entries
    Persistent,
}

impl CacheStrategy {
    /// Time to live in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        match self {
            CacheStrategy::NoCache => 0,
            CacheStrategy::ShortTerm => 300,
            CacheStrategy::MediumTerm => 1800,
            CacheStrategy::LongTerm => 7200,
            CacheStrategy::Persistent => 86400,
        }
    }

    /// Maximum number of live entries.
    pub fn max_entries(&self) -> usize {
        match self {
            CacheStrategy::NoCache => 0,
            CacheStrategy::ShortTerm => 100,
            CacheStrategy::MediumTerm => 200,
            CacheStrategy::LongTerm => 50,
            CacheStrategy::Persistent => 20,
        }
    }

    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::NoCache => "no_cache",
            CacheStrategy::ShortTerm => "short_term",
            CacheStrategy::MediumTerm => "medium_term",
            CacheStrategy::LongTerm => "long_term",
            CacheStrategy::Persistent => "persistent",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Time;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        chrono::Utc::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    strategy: CacheStrategy,
    expires_at: Time,
    last_accessed: Time,
    access_count: u64,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Successful lookups
    pub hits: u64,
    /// Failed or expired lookups
    pub misses: u64,
    /// Entries removed by capacity or expiry
    pub evictions: u64,
    /// Live entries
    pub size: usize,
    /// `hits / total_requests`
    pub hit_rate: f64,
    /// `hits + misses`
    pub total_requests: u64,
    /// Live entries per strategy
    pub strategy_distribution: BTreeMap<String, usize>,
}

/// Resource cache.
pub struct ResourceCache {
    entries: HashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("size", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl ResourceCache {
    /// Empty cache on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty cache on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// `{type}:{id}:{md5(params)[..8]}`.
    ///
    /// `serde_json` maps are key-ordered, so equal params give equal keys
    /// regardless of insertion order.
    pub fn make_key(resource_type: &str, resource_id: &str, params: &Value) -> String {
        let digest = format!("{:x}", md5::compute(params.to_string().as_bytes()));
        format!("{}:{}:{}", resource_type, resource_id, &digest[..8])
    }

    /// Look up a live entry.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.expires_at > now {
                entry.last_accessed = now;
                entry.access_count += 1;
                self.hits += 1;
                return Some(entry.value.clone());
            }
            self.entries.remove(key);
            self.evictions += 1;
            debug!("Cache entry expired: {}", key);
        }
        self.misses += 1;
        None
    }

    /// Store `value` under `key`.
    pub fn set(&mut self, key: impl Into<String>, value: Value, strategy: CacheStrategy) {
        if strategy == CacheStrategy::NoCache {
            return;
        }
        let key = key.into();

        if !self.entries.contains_key(&key) {
            let held = self.entries.values().filter(|e| e.strategy == strategy).count();
            if held >= strategy.max_entries() {
                self.evict_lru(strategy);
            }
        }

        let now = self.clock.now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                strategy,
                expires_at: now + chrono::Duration::seconds(strategy.ttl_seconds()),
                last_accessed: now,
                access_count: 0,
            },
        );
    }

    fn evict_lru(&mut self, strategy: CacheStrategy) {
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| e.strategy == strategy)
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions += 1;
            debug!("Evicted {} entry: {}", strategy, key);
        }
    }

    /// Drop one key. Returns whether it was present.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key starting with `prefix`.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before - self.entries.len()
    }

    /// Drop every expired entry.
    pub fn clear_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        let removed = before - self.entries.len();
        self.evictions += removed as u64;
        removed
    }

    /// Drop everything and reset counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Access count of an entry.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.access_count)
    }

    /// Counters snapshot.
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let mut distribution = BTreeMap::new();
        for entry in self.entries.values() {
            *distribution.entry(entry.strategy.as_str().to_string()).or_insert(0) += 1;
        }
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.entries.len(),
            hit_rate: if total == 0 { 0.0 } else { self.hits as f64 / total as f64 },
            total_requests: total,
            strategy_distribution: distribution,
        }
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct ManualClock(Mutex<Time>);

    impl ManualClock {
        fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Time {
            *self.0.lock().unwrap()
        }
    }

    fn manual() -> (Arc<ManualClock>, ResourceCache) {
        let clock = Arc::new(ManualClock(Mutex::new(chrono::Utc::now())));
        let cache = ResourceCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = ResourceCache::make_key("project", "state", &json!({"a": 1, "b": 2}));
        let b = ResourceCache::make_key("project", "state", &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
        assert!(a.starts_with("project:state:"));
        assert_eq!(a.len(), "project:state:".len() + 8);
        assert_ne!(a, ResourceCache::make_key("project", "state", &json!({"a": 2})));
    }

    #[test]
    fn test_hit_miss_and_expiry() {
        let (clock, mut cache) = manual();
        cache.set("k", json!(1), CacheStrategy::ShortTerm);

        assert_eq!(cache.get("k"), Some(json!(1)));
        assert_eq!(cache.access_count("k"), Some(1));
        assert_eq!(cache.get("missing"), None);

        clock.advance(301);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.total_requests, 3);
    }

    #[test]
    fn test_no_cache_is_noop() {
        let mut cache = ResourceCache::new();
        cache.set("k", json!(1), CacheStrategy::NoCache);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_strategy_evicts_lru_of_that_strategy() {
        let (clock, mut cache) = manual();
        cache.set("short", json!("s"), CacheStrategy::ShortTerm);
        for i in 0..20 {
            cache.set(format!("p{}", i), json!(i), CacheStrategy::Persistent);
            clock.advance(1);
        }
        // Touch p0 so p1 becomes the oldest.
        cache.get("p0");
        clock.advance(1);

        cache.set("p20", json!(20), CacheStrategy::Persistent);
        assert_eq!(cache.len(), 21);
        assert!(cache.access_count("p1").is_none());
        assert!(cache.access_count("p0").is_some());
        assert!(cache.access_count("short").is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().strategy_distribution["persistent"], 20);
    }

    #[test]
    fn test_invalidation() {
        let (clock, mut cache) = manual();
        cache.set("project:state:1", json!(1), CacheStrategy::MediumTerm);
        cache.set("project:state:2", json!(2), CacheStrategy::MediumTerm);
        cache.set("stage:guide:1", json!(3), CacheStrategy::ShortTerm);

        assert!(cache.invalidate("project:state:1"));
        assert!(!cache.invalidate("project:state:1"));
        assert_eq!(cache.invalidate_prefix("project:"), 1);

        clock.advance(600);
        assert_eq!(cache.clear_expired(), 1);
        assert!(cache.is_empty());

        cache.set("x", json!(0), CacheStrategy::LongTerm);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}

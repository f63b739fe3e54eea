//! Result cache store
//!
//! Namespaced, thread-safe TTL+LRU cache for tool results and backend API
//! responses. Keys are derived from `(tool, canonicalized params)` so
//! argument order never affects lookups. The store is best-effort only:
//! internal failures degrade to a miss and are never surfaced to callers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::cache::util::{hash_json, LruCache, LruCacheConfig};
use crate::config::CacheSettings;

/// Namespace for tool execution results
pub const NS_TOOL_RESULTS: &str = "tool_results";

/// Namespace for backend API responses (tool listings etc.)
pub const NS_API_RESPONSES: &str = "api_responses";

/// Cache key: unique within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    tool: String,
    params_hash: u64,
}

impl CacheKey {
    pub fn new(namespace: &str, tool: &str, params: &Value) -> Self {
        Self {
            namespace: namespace.to_string(),
            tool: tool.to_string(),
            params_hash: hash_json(params),
        }
    }
}

/// A cached result with its lifecycle metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_access_at: Instant,
    size_bytes: usize,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration, size_bytes: usize) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_access_at: now,
            size_bytes,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct StoreCounters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

#[derive(Debug)]
struct StoreInner {
    lru: LruCache<CacheKey, CacheEntry>,
    /// (namespace, tool) -> param hashes, for O(k) bulk invalidation
    tool_index: HashMap<(String, String), HashSet<u64>>,
    counters: StoreCounters,
}

impl StoreInner {
    fn index_insert(&mut self, key: &CacheKey) {
        self.tool_index
            .entry((key.namespace.clone(), key.tool.clone()))
            .or_default()
            .insert(key.params_hash);
    }

    fn index_remove(&mut self, key: &CacheKey) {
        let index_key = (key.namespace.clone(), key.tool.clone());
        if let Some(hashes) = self.tool_index.get_mut(&index_key) {
            hashes.remove(&key.params_hash);
            if hashes.is_empty() {
                self.tool_index.remove(&index_key);
            }
        }
    }
}

#[derive(Debug)]
struct SweeperHandle {
    shutdown: watch::Sender<bool>,
}

/// Namespaced TTL+LRU result cache
///
/// All mutation is serialized through one internal lock; `get`/`set` clone
/// JSON values in and out so callers never hold references into the store.
#[derive(Debug)]
pub struct CacheStore {
    inner: Mutex<StoreInner>,
    default_ttl: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl CacheStore {
    /// Create a store from cache settings
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_limits(
            settings.max_size,
            settings.max_memory_bytes(),
            settings.ttl(),
            settings.cleanup_interval(),
        )
    }

    /// Create a store with explicit limits
    pub fn with_limits(
        max_size: usize,
        max_bytes: usize,
        default_ttl: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                lru: LruCache::with_config(LruCacheConfig::with_memory(max_size, max_bytes)),
                tool_index: HashMap::new(),
                counters: StoreCounters::default(),
            }),
            default_ttl,
            sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    /// Look up a cached result.
    ///
    /// A hit promotes the entry to most-recently-used and bumps its access
    /// metadata. Expired entries are removed lazily here and count as a miss.
    pub fn get(&self, namespace: &str, tool: &str, params: &Value) -> Option<Value> {
        let key = CacheKey::new(namespace, tool, params);
        let now = Instant::now();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // First pass only touches the entry; removal happens after the
        // borrow ends.
        let hit = match inner.lru.get_mut(&key) {
            None => None,
            Some(entry) => {
                if entry.is_expired(now) {
                    Some(None)
                } else {
                    entry.access_count += 1;
                    entry.last_access_at = now;
                    Some(Some(entry.value.clone()))
                }
            }
        };

        match hit {
            None => {
                inner.counters.misses += 1;
                None
            }
            Some(None) => {
                inner.lru.remove(&key);
                inner.index_remove(&key);
                inner.counters.expirations += 1;
                inner.counters.misses += 1;
                trace!(tool, namespace, "cache entry expired on read");
                None
            }
            Some(Some(value)) => {
                inner.counters.hits += 1;
                Some(value)
            }
        }
    }

    /// Store a result.
    ///
    /// `ttl` defaults to the store-wide TTL. Values that fail size
    /// estimation are silently not cached; the cache never raises.
    pub fn set(&self, namespace: &str, tool: &str, params: &Value, value: Value, ttl: Option<Duration>) {
        let size_bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                debug!(tool, error = %e, "value not cacheable, skipping");
                return;
            }
        };

        let key = CacheKey::new(namespace, tool, params);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(value, ttl, size_bytes);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let evicted = inner.lru.insert_with_size(key.clone(), entry, size_bytes);
        let mut self_evicted = false;
        for (evicted_key, _) in &evicted {
            if *evicted_key == key {
                self_evicted = true;
            }
            inner.index_remove(evicted_key);
            inner.counters.evictions += 1;
        }

        // An entry bigger than the whole byte budget evicts itself; nothing
        // to index in that case.
        if self_evicted {
            debug!(tool, size_bytes, "entry exceeds cache memory budget, not cached");
        } else {
            inner.index_insert(&key);
        }
    }

    /// Remove every cached result for one tool within a namespace
    pub fn invalidate_tool(&self, namespace: &str, tool: &str) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let index_key = (namespace.to_string(), tool.to_string());
        let Some(hashes) = inner.tool_index.remove(&index_key) else {
            return 0;
        };

        let mut removed = 0;
        for params_hash in hashes {
            let key = CacheKey {
                namespace: namespace.to_string(),
                tool: tool.to_string(),
                params_hash,
            };
            if inner.lru.remove(&key).is_some() {
                removed += 1;
            }
        }
        debug!(namespace, tool, removed, "invalidated tool results");
        removed
    }

    /// Remove one cached result
    pub fn invalidate_key(&self, namespace: &str, tool: &str, params: &Value) -> bool {
        let key = CacheKey::new(namespace, tool, params);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let removed = inner.lru.remove(&key).is_some();
        if removed {
            inner.index_remove(&key);
        }
        removed
    }

    /// Remove every entry in one namespace
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let removed = inner.lru.retain(|key, _| key.namespace != namespace);
        inner
            .tool_index
            .retain(|(ns, _), _| ns != namespace);
        removed.len()
    }

    /// Remove everything; counters are preserved
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.lru.clear();
        inner.tool_index.clear();
    }

    /// Remove all TTL-expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let removed = inner.lru.retain(|_, entry| !entry.is_expired(now));
        for (key, _) in &removed {
            inner.index_remove(key);
        }
        inner.counters.expirations += removed.len() as u64;
        removed.len()
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Current cache statistics
    pub fn stats(&self) -> CacheStoreStats {
        let guard = self.inner.lock();
        let total = guard.counters.hits + guard.counters.misses;
        let hit_rate = if total > 0 {
            guard.counters.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        CacheStoreStats {
            hits: guard.counters.hits,
            misses: guard.counters.misses,
            hit_rate,
            entries: guard.lru.len(),
            max_entries: guard.lru.capacity(),
            bytes: guard.lru.current_bytes(),
            max_bytes: guard.lru.max_bytes(),
            evictions: guard.counters.evictions,
            expirations: guard.counters.expirations,
        }
    }

    /// Whether the store currently sits within its size and memory budgets
    pub fn within_budget(&self) -> bool {
        let guard = self.inner.lock();
        let entries_ok = guard.lru.len() <= guard.lru.capacity();
        let bytes_ok = guard.lru.max_bytes() == 0 || guard.lru.current_bytes() <= guard.lru.max_bytes();
        entries_ok && bytes_ok
    }

    // ========================================================================
    // Sweeper lifecycle
    // ========================================================================

    /// Start the periodic expiry sweep. No-op if already running.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }

        let (shutdown, mut watcher) = watch::channel(false);
        let store = Arc::clone(self);
        let interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.cleanup_expired();
                        if removed > 0 {
                            debug!(removed, "cache sweep removed expired entries");
                        }
                    }
                    _ = watcher.changed() => break,
                }
            }
        });

        *slot = Some(SweeperHandle { shutdown });
    }

    /// Stop the periodic sweep. Idempotent.
    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            let _ = handle.shutdown.send(true);
        }
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CacheStoreStats {
    pub hits: u64,
    pub misses: u64,
    /// Hit percentage over all lookups (0-100)
    pub hit_rate: f64,
    pub entries: usize,
    pub max_entries: usize,
    pub bytes: usize,
    pub max_bytes: usize,
    pub evictions: u64,
    pub expirations: u64,
}

//! Resource manager
//!
//! Memoizes objects that are expensive to construct (backend model handles,
//! agent configurations, tool adapters), keyed by
//! `(category, name, config-hash)`. Construction is single-flight: for a
//! given key, at most one factory invocation is ever in flight, and
//! concurrent requesters join it instead of starting their own. A
//! per-category semaphore bounds how many constructions run at once so a
//! burst of cold starts cannot overwhelm the backend.
//!
//! The manager is constructed explicitly and shared via `Arc`; there is no
//! hidden process-wide singleton.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use relay_foundation::{hash_json, Error, ResourceSettings, Result};

/// Type-erased shared resource
pub type SharedResource = Arc<dyn Any + Send + Sync>;

/// Resource categories, each with its own construction ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Agent,
    Model,
    Tool,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Agent => "agent",
            ResourceCategory::Model => "model",
            ResourceCategory::Tool => "tool",
        }
    }

    const ALL: [ResourceCategory; 3] = [
        ResourceCategory::Agent,
        ResourceCategory::Model,
        ResourceCategory::Tool,
    ];
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key for a memoized resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    category: ResourceCategory,
    name: String,
    config_hash: u64,
}

impl ResourceKey {
    /// Build a key; the config hash is order-independent over object keys
    pub fn new(category: ResourceCategory, name: &str, config: &Value) -> Self {
        Self {
            category,
            name: name.to_string(),
            config_hash: hash_json(config),
        }
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{:08x}", self.category, self.name, self.config_hash)
    }
}

/// A memoized resource with its lifecycle metadata
#[derive(Debug)]
struct ResourceHandle {
    resource: SharedResource,
    created_at: Instant,
    /// How long the factory took
    creation_time: Duration,
    ttl: Duration,
    access_count: u64,
    last_access_at: Instant,
}

impl ResourceHandle {
    fn new(resource: SharedResource, creation_time: Duration, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            resource,
            created_at: now,
            creation_time,
            ttl,
            access_count: 0,
            last_access_at: now,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

/// In-flight construction state observed by joiners. `None` until the
/// leader finishes; failures carry the message so every joiner sees the
/// same error.
type FlightState = Option<std::result::Result<SharedResource, String>>;

#[derive(Debug, Default)]
struct ManagerCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    creations: AtomicU64,
    construction_failures: AtomicU64,
    joins: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

#[derive(Debug)]
struct SweeperHandle {
    shutdown: watch::Sender<bool>,
}

/// Memoizing resource manager with bounded, single-flight construction
pub struct ResourceManager {
    handles: Mutex<HashMap<ResourceKey, ResourceHandle>>,
    flights: Mutex<HashMap<ResourceKey, watch::Receiver<FlightState>>>,
    semaphores: HashMap<ResourceCategory, Arc<Semaphore>>,
    counters: ManagerCounters,
    max_handles: usize,
    default_ttl: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl ResourceManager {
    /// Create a manager from resource settings
    pub fn new(settings: &ResourceSettings) -> Self {
        let mut semaphores = HashMap::new();
        semaphores.insert(
            ResourceCategory::Agent,
            Arc::new(Semaphore::new(settings.max_concurrent_agents)),
        );
        semaphores.insert(
            ResourceCategory::Model,
            Arc::new(Semaphore::new(settings.max_concurrent_models)),
        );
        semaphores.insert(
            ResourceCategory::Tool,
            Arc::new(Semaphore::new(settings.max_concurrent_tools)),
        );

        Self {
            handles: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            semaphores,
            counters: ManagerCounters::default(),
            max_handles: settings.max_handles,
            default_ttl: settings.handle_ttl(),
            sweep_interval: settings.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    /// Fetch a memoized resource, constructing it through `factory` on a
    /// cold key.
    ///
    /// Concurrent callers for the same key observe exactly one factory
    /// invocation and share its result; a factory failure propagates to the
    /// whole cohort and is not cached. Construction (not use) is bounded by
    /// the category's semaphore.
    pub async fn get_or_create<T, F, Fut>(
        &self,
        category: ResourceCategory,
        name: &str,
        config: &Value,
        factory: F,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = ResourceKey::new(category, name, config);

        if let Some(found) = self.lookup(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return downcast(found, &key);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        enum Role {
            Leader(watch::Sender<FlightState>),
            Joiner(watch::Receiver<FlightState>),
        }

        let role = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some(rx) => Role::Joiner(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    flights.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Joiner(mut rx) => {
                self.counters.joins.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joining in-flight construction");

                let outcome = match rx.wait_for(|state| state.is_some()).await {
                    Ok(state) => state.clone(),
                    // Leader dropped without publishing (cancelled)
                    Err(_) => Some(Err("construction aborted".to_string())),
                };

                match outcome {
                    Some(Ok(shared)) => downcast(shared, &key),
                    Some(Err(message)) => Err(Error::construction(key.to_string(), message)),
                    None => Err(Error::construction(
                        key.to_string(),
                        "construction aborted".to_string(),
                    )),
                }
            }
            Role::Leader(tx) => {
                // Removes the flight entry even if this future is cancelled,
                // so later callers never join a dead channel.
                let _flight_guard = FlightGuard { manager: self, key: key.clone() };

                let semaphore = Arc::clone(&self.semaphores[&category]);
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::Internal("construction semaphore closed".to_string()))?;

                // Double-check after acquiring the permit: a prior leader may
                // have finished while this one waited.
                if let Some(found) = self.lookup(&key) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    let _ = tx.send(Some(Ok(found.clone())));
                    return downcast(found, &key);
                }

                let started = Instant::now();
                match factory().await {
                    Ok(resource) => {
                        let shared: SharedResource = Arc::new(resource);
                        let creation_time = started.elapsed();
                        self.store(key.clone(), shared.clone(), creation_time);
                        self.counters.creations.fetch_add(1, Ordering::Relaxed);
                        info!(key = %key, elapsed_ms = creation_time.as_millis() as u64, "resource constructed");
                        let _ = tx.send(Some(Ok(shared.clone())));
                        downcast(shared, &key)
                    }
                    Err(e) => {
                        self.counters
                            .construction_failures
                            .fetch_add(1, Ordering::Relaxed);
                        warn!(key = %key, error = %e, "resource construction failed");
                        let _ = tx.send(Some(Err(e.to_string())));
                        Err(Error::construction(key.to_string(), e.to_string()))
                    }
                }
            }
        }
    }

    /// Look up a live handle, bumping its access metadata
    fn lookup(&self, key: &ResourceKey) -> Option<SharedResource> {
        let mut handles = self.handles.lock();
        let expired = match handles.get_mut(key) {
            None => return None,
            Some(handle) => {
                if handle.is_expired(Instant::now()) {
                    true
                } else {
                    handle.access_count += 1;
                    handle.last_access_at = Instant::now();
                    return Some(handle.resource.clone());
                }
            }
        };
        if expired {
            handles.remove(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "resource handle expired");
        }
        None
    }

    fn store(&self, key: ResourceKey, resource: SharedResource, creation_time: Duration) {
        let mut handles = self.handles.lock();
        handles.insert(
            key,
            ResourceHandle::new(resource, creation_time, self.default_ttl),
        );

        // LRU eviction by last access
        while handles.len() > self.max_handles {
            let oldest = handles
                .iter()
                .min_by_key(|(_, h)| h.last_access_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    handles.remove(&k);
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %k, "evicted least-recently-used resource handle");
                }
                None => break,
            }
        }
    }

    /// Drop a specific handle; in-flight users keep their `Arc`
    pub fn invalidate(&self, category: ResourceCategory, name: &str, config: &Value) -> bool {
        let key = ResourceKey::new(category, name, config);
        self.handles.lock().remove(&key).is_some()
    }

    /// Remove all TTL-expired handles, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut handles = self.handles.lock();
        let before = handles.len();
        handles.retain(|_, h| !h.is_expired(now));
        let removed = before - handles.len();
        self.counters
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Current manager statistics
    pub fn stats(&self) -> ResourceManagerStats {
        let handles = self.handles.lock();
        let mut per_category: HashMap<String, usize> = HashMap::new();
        for category in ResourceCategory::ALL {
            per_category.insert(category.as_str().to_string(), 0);
        }
        for key in handles.keys() {
            *per_category
                .entry(key.category.as_str().to_string())
                .or_insert(0) += 1;
        }

        ResourceManagerStats {
            live_handles: handles.len(),
            max_handles: self.max_handles,
            per_category,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            creations: self.counters.creations.load(Ordering::Relaxed),
            construction_failures: self.counters.construction_failures.load(Ordering::Relaxed),
            single_flight_joins: self.counters.joins.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the periodic TTL sweep. No-op if already running.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }

        let (shutdown, mut watcher) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "resource sweep removed expired handles");
                        }
                    }
                    _ = watcher.changed() => break,
                }
            }
        });

        *slot = Some(SweeperHandle { shutdown });
    }

    /// Cancel the sweep and clear all handles. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            let _ = handle.shutdown.send(true);
        }
        let cleared = {
            let mut handles = self.handles.lock();
            let n = handles.len();
            handles.clear();
            n
        };
        if cleared > 0 {
            info!(cleared, "resource manager shut down");
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("live_handles", &self.handles.lock().len())
            .field("max_handles", &self.max_handles)
            .finish_non_exhaustive()
    }
}

struct FlightGuard<'a> {
    manager: &'a ResourceManager,
    key: ResourceKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.manager.flights.lock().remove(&self.key);
    }
}

fn downcast<T: Send + Sync + 'static>(shared: SharedResource, key: &ResourceKey) -> Result<Arc<T>> {
    shared
        .downcast::<T>()
        .map_err(|_| Error::Internal(format!("resource type mismatch for {key}")))
}

/// Serializable manager statistics
#[derive(Debug, Clone, Serialize)]
pub struct ResourceManagerStats {
    pub live_handles: usize,
    pub max_handles: usize,
    pub per_category: HashMap<String, usize>,
    pub hits: u64,
    pub misses: u64,
    pub creations: u64,
    pub construction_failures: u64,
    pub single_flight_joins: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn settings() -> ResourceSettings {
        ResourceSettings::default()
    }

    fn manager() -> Arc<ResourceManager> {
        Arc::new(ResourceManager::new(&settings()))
    }

    #[tokio::test]
    async fn test_memoizes_by_key() {
        let mgr = manager();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let handle: Arc<String> = mgr
                .get_or_create(ResourceCategory::Model, "llama", &json!({"size": "7b"}), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok("model-handle".to_string()) }
                })
                .await
                .unwrap();
            assert_eq!(*handle, "model-handle");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = mgr.stats();
        assert_eq!(stats.creations, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_config_hash_distinguishes_keys() {
        let mgr = manager();
        let calls = AtomicUsize::new(0);

        for config in [json!({"size": "7b"}), json!({"size": "70b"})] {
            let _: Arc<String> = mgr
                .get_or_create(ResourceCategory::Model, "llama", &config, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok("handle".to_string()) }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_construction() {
        let mgr = manager();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                mgr.get_or_create(ResourceCategory::Agent, "planner", &json!({}), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("agent-config".to_string())
                    }
                })
                .await
            }));
        }

        let mut results: Vec<Arc<String>> = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Every caller shares the same allocation
        for result in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], result));
        }
        assert!(mgr.stats().single_flight_joins >= 1);
    }

    #[tokio::test]
    async fn test_construction_failure_mirrored_and_not_cached() {
        let mgr = manager();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let mgr = Arc::clone(&mgr);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                mgr.get_or_create::<String, _, _>(
                    ResourceCategory::Tool,
                    "broken",
                    &json!({}),
                    move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Err(Error::Internal("factory exploded".to_string()))
                        }
                    },
                )
                .await
            }));
        }

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::Construction { .. }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Failure was not cached: the next call invokes the factory again
        let result: Result<Arc<String>> = mgr
            .get_or_create(ResourceCategory::Tool, "broken", &json!({}), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("recovered".to_string()) }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_category_semaphore_bounds_construction() {
        let settings = ResourceSettings {
            max_concurrent_models: 1,
            ..Default::default()
        };
        let mgr = Arc::new(ResourceManager::new(&settings));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..4 {
            let mgr = Arc::clone(&mgr);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let name = format!("model-{i}");
                mgr.get_or_create(ResourceCategory::Model, &name, &json!({}), move || async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(42u32)
                })
                .await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reconstructs() {
        let settings = ResourceSettings {
            handle_ttl_secs: 0, // expires immediately
            ..Default::default()
        };
        let mgr = Arc::new(ResourceManager::new(&settings));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let _: Arc<u32> = mgr
                .get_or_create(ResourceCategory::Tool, "clock", &json!({}), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(7u32) }
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction_bounds_handles() {
        let settings = ResourceSettings {
            max_handles: 2,
            ..Default::default()
        };
        let mgr = Arc::new(ResourceManager::new(&settings));

        for name in ["a", "b", "c"] {
            let _: Arc<String> = mgr
                .get_or_create(ResourceCategory::Tool, name, &json!({}), || async {
                    Ok(name.to_string())
                })
                .await
                .unwrap();
            // Distinct last_access stamps
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let stats = mgr.stats();
        assert_eq!(stats.live_handles, 2);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reconstruction() {
        let mgr = manager();
        let calls = AtomicUsize::new(0);
        let config = json!({"model": "small"});

        for _ in 0..2 {
            let _: Arc<String> = mgr
                .get_or_create(ResourceCategory::Model, "m", &config, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok("handle".to_string()) }
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(mgr.invalidate(ResourceCategory::Model, "m", &config));
        assert!(!mgr.invalidate(ResourceCategory::Model, "m", &config));

        let _: Arc<String> = mgr
            .get_or_create(ResourceCategory::Model, "m", &config, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("handle".to_string()) }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_error() {
        let mgr = manager();

        let _: Arc<String> = mgr
            .get_or_create(ResourceCategory::Tool, "t", &json!({}), || async {
                Ok("value".to_string())
            })
            .await
            .unwrap();

        let result: Result<Arc<u32>> = mgr
            .get_or_create(ResourceCategory::Tool, "t", &json!({}), || async { Ok(1u32) })
            .await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mgr = manager();
        let _: Arc<u32> = mgr
            .get_or_create(ResourceCategory::Agent, "a", &json!({}), || async { Ok(1u32) })
            .await
            .unwrap();

        mgr.start_sweeper();
        mgr.shutdown();
        mgr.shutdown();
        assert_eq!(mgr.stats().live_handles, 0);
    }
}

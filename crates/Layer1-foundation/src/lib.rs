//! # relay-foundation
//!
//! Foundation layer for Relay:
//! - Error: central error taxonomy shared by every layer
//! - Config: `RelayConfig` (backend, cache, pool, resources)
//! - Cache: namespaced TTL+LRU result store with byte accounting

pub mod cache;
pub mod config;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    BackendConfig, CacheSettings, ConnectionPoolConfig, RelayConfig, ResourceSettings,
    RELAY_CONFIG_FILE,
};

// ============================================================================
// Cache
// ============================================================================
pub use cache::{
    hash_json,
    CacheEntry,
    CacheKey,
    CacheStore,
    CacheStoreStats,
    // Utilities
    LruCache,
    LruCacheConfig,
    NS_API_RESPONSES,
    NS_TOOL_RESULTS,
};

//! Relay configuration
//!
//! One `RelayConfig` covers the whole bridge: backend endpoint, cache
//! budgets, connection pool tuning, and resource-manager ceilings.
//! Resolution order: project file (`.relay/config.toml`) over global file
//! (`~/.relay/config.toml`) over built-in defaults, then environment
//! variable overrides on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration file name, searched in `.relay/` directories
pub const RELAY_CONFIG_FILE: &str = "config.toml";

/// Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Backend tool-service endpoint
    #[serde(default)]
    pub backend: BackendConfig,

    /// Result cache budgets
    #[serde(default)]
    pub cache: CacheSettings,

    /// HTTP connection pool tuning
    #[serde(default)]
    pub pool: ConnectionPoolConfig,

    /// Resource manager ceilings
    #[serde(default)]
    pub resources: ResourceSettings,
}

/// Backend endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend tool service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as the `x-api-key` header
    #[serde(default)]
    pub api_key: String,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of cached entries
    #[serde(default = "default_max_cache_size")]
    pub max_size: usize,

    /// Default TTL for cached results (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum estimated memory across all cached entries (MB)
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,

    /// Interval between expiry sweeps (seconds)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// HTTP connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    /// Maximum in-flight requests across the pool
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    /// Maximum idle connections kept per host
    #[serde(default = "default_max_per_host")]
    pub max_per_host: usize,

    /// Idle connection keep-alive (seconds)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP connect timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Socket read timeout (seconds)
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Whole-request timeout (seconds)
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,
}

/// Resource manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSettings {
    /// Maximum number of live handles before LRU eviction
    #[serde(default = "default_max_handles")]
    pub max_handles: usize,

    /// Default TTL for memoized handles (seconds)
    #[serde(default = "default_handle_ttl_secs")]
    pub handle_ttl_secs: u64,

    /// Interval between TTL sweeps (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Concurrent construction ceiling for agent resources
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    /// Concurrent construction ceiling for model resources
    #[serde(default = "default_max_concurrent_models")]
    pub max_concurrent_models: usize,

    /// Concurrent construction ceiling for tool adapters
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_user_agent() -> String {
    format!("relay/{}", env!("CARGO_PKG_VERSION"))
}
fn default_max_cache_size() -> usize {
    1000
}
fn default_cache_ttl_secs() -> u64 {
    300
} // 5 minutes
fn default_max_memory_mb() -> usize {
    100
}
fn default_cleanup_interval_secs() -> u64 {
    300
}
fn default_max_total() -> usize {
    100
}
fn default_max_per_host() -> usize {
    30
}
fn default_keepalive_secs() -> u64 {
    300
} // 5 minutes
fn default_connect_timeout_secs() -> u64 {
    3
}
fn default_read_timeout_secs() -> u64 {
    5
}
fn default_total_timeout_secs() -> u64 {
    10
}
fn default_max_handles() -> usize {
    64
}
fn default_handle_ttl_secs() -> u64 {
    3600
} // 1 hour
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_max_concurrent_agents() -> usize {
    10
}
fn default_max_concurrent_models() -> usize {
    5
}
fn default_max_concurrent_tools() -> usize {
    20
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_cache_size(),
            ttl_secs: default_cache_ttl_secs(),
            max_memory_mb: default_max_memory_mb(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_total: default_max_total(),
            max_per_host: default_max_per_host(),
            keepalive_secs: default_keepalive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            total_timeout_secs: default_total_timeout_secs(),
        }
    }
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            max_handles: default_max_handles(),
            handle_ttl_secs: default_handle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_concurrent_agents: default_max_concurrent_agents(),
            max_concurrent_models: default_max_concurrent_models(),
            max_concurrent_tools: default_max_concurrent_tools(),
        }
    }
}

impl CacheSettings {
    /// Default TTL as a Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Memory budget in bytes
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb * 1024 * 1024
    }

    /// Sweep interval as a Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl ConnectionPoolConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }
}

impl ResourceSettings {
    pub fn handle_ttl(&self) -> Duration {
        Duration::from_secs(self.handle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Load configuration: global file, then project file, then environment
    /// overrides. A project file replaces the global one wholesale.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(global) = Self::global_path() {
            if let Some(loaded) = Self::load_file(&global)? {
                config = loaded;
            }
        }

        let project = Path::new(".relay").join(RELAY_CONFIG_FILE);
        if let Some(loaded) = Self::load_file(&project)? {
            config = loaded;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a specific config file; `Ok(None)` when the file does not exist
    pub fn load_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    fn global_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".relay").join(RELAY_CONFIG_FILE))
    }

    /// Environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RELAY_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(key) = std::env::var("RELAY_API_KEY") {
            self.backend.api_key = key;
        }
        if let Ok(size) = std::env::var("RELAY_MAX_CACHE_SIZE") {
            if let Ok(size) = size.parse() {
                self.cache.max_size = size;
            }
        }
        if let Ok(ttl) = std::env::var("RELAY_CACHE_TTL_SECS") {
            if let Ok(ttl) = ttl.parse() {
                self.cache.ttl_secs = ttl;
            }
        }
        if let Ok(mb) = std::env::var("RELAY_MAX_MEMORY_MB") {
            if let Ok(mb) = mb.parse() {
                self.cache.max_memory_mb = mb;
            }
        }
    }

    // ========================================================================
    // Presets
    // ========================================================================

    /// Minimal preset for resource-constrained environments
    pub fn minimal() -> Self {
        Self {
            cache: CacheSettings {
                max_size: 100,
                ttl_secs: 120,
                max_memory_mb: 20,
                cleanup_interval_secs: 120,
            },
            pool: ConnectionPoolConfig {
                max_total: 20,
                max_per_host: 5,
                ..Default::default()
            },
            resources: ResourceSettings {
                max_handles: 16,
                max_concurrent_agents: 4,
                max_concurrent_models: 2,
                max_concurrent_tools: 8,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Aggressive caching preset for throughput
    pub fn performance() -> Self {
        Self {
            cache: CacheSettings {
                max_size: 5000,
                ttl_secs: 900,
                max_memory_mb: 250,
                cleanup_interval_secs: 600,
            },
            pool: ConnectionPoolConfig {
                max_total: 200,
                max_per_host: 50,
                ..Default::default()
            },
            resources: ResourceSettings {
                max_handles: 256,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.pool.max_total, 100);
        assert_eq!(config.pool.max_per_host, 30);
        assert_eq!(config.pool.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.pool.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.pool.total_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.max_memory_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.resources.max_concurrent_models, 5);
    }

    #[test]
    fn test_presets() {
        let minimal = RelayConfig::minimal();
        assert!(minimal.cache.max_size < RelayConfig::default().cache.max_size);

        let perf = RelayConfig::performance();
        assert!(perf.pool.max_total > RelayConfig::default().pool.max_total);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RELAY_CONFIG_FILE);
        std::fs::write(
            &path,
            "[backend]\nbase_url = \"http://tools.internal:9000\"\n\n[cache]\nmax_size = 42\n",
        )
        .unwrap();

        let config = RelayConfig::load_file(&path).unwrap().unwrap();
        assert_eq!(config.backend.base_url, "http://tools.internal:9000");
        assert_eq!(config.cache.max_size, 42);
        // Unspecified sections keep defaults
        assert_eq!(config.pool.max_total, 100);
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RELAY_CONFIG_FILE);
        std::fs::write(&path, "backend = 17").unwrap();

        let err = RelayConfig::load_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(RelayConfig::load_file(&path).unwrap().is_none());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("RELAY_MAX_CACHE_SIZE", "7");
        let mut config = RelayConfig::default();
        config.apply_env_overrides();
        std::env::remove_var("RELAY_MAX_CACHE_SIZE");
        assert_eq!(config.cache.max_size, 7);
    }
}

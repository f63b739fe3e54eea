//! # Relay cache system
//!
//! Result caching for the tool-execution bridge.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     CacheStore                        │
//! │  namespaced TTL+LRU store with byte accounting        │
//! │  ├── "tool_results"   (execute() results)             │
//! │  └── "api_responses"  (tool listings)                 │
//! ├──────────────────────────────────────────────────────┤
//! │                    util::LruCache                     │
//! │  generic LRU with entry + byte budgets                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The store is best-effort: a value that cannot be size-estimated is
//! simply not cached, and every lookup failure is an ordinary miss.

pub mod store;
pub mod util;

pub use store::{CacheEntry, CacheKey, CacheStore, CacheStoreStats, NS_API_RESPONSES, NS_TOOL_RESULTS};
pub use util::{hash_json, LruCache, LruCacheConfig};

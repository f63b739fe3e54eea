//! # relay-core
//!
//! Core runtime for Relay:
//! - ResourceManager: memoizes expensive objects with single-flight,
//!   semaphore-bounded construction
//! - ToolExecutionBridge: the cache-aside + remote + fallback façade
//! - BlockingBridge: synchronous adapter at the process boundary
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ToolExecutionBridge                      │
//! │   execute(request) -> cache | remote | local fallback     │
//! ├────────────────┬─────────────────────┬───────────────────┤
//! │   CacheStore   │   ConnectionPool    │ FallbackRegistry  │
//! │ (foundation)   │    (transport)      │    (in-process)   │
//! └────────────────┴─────────────────────┴───────────────────┘
//!          ResourceManager (shared, constructed explicitly)
//! ```

pub mod bridge;
pub mod resource;
pub mod sync;

// ============================================================================
// Bridge
// ============================================================================
pub use bridge::{
    ExecutionOutcome,
    ExecutionStats,
    ExecutionStatsSnapshot,
    FallbackHandler,
    FallbackRegistry,
    HealthReport,
    MemorySearchParams,
    MetricsReport,
    OutcomeError,
    ResultSource,
    TimeParams,
    ToolDescriptor,
    ToolExecutionBridge,
    ToolRegistryReport,
    ToolRequest,
    WeatherParams,
    HEALTHY_SUCCESS_RATE,
};

// ============================================================================
// Resources
// ============================================================================
pub use resource::{
    ResourceCategory, ResourceKey, ResourceManager, ResourceManagerStats, SharedResource,
};

// ============================================================================
// Sync adapter
// ============================================================================
pub use sync::BlockingBridge;

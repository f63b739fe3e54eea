//! Tool execution bridge
//!
//! - [`request`] - typed tool requests validated at the boundary
//! - [`fallback`] - in-process fallback registry
//! - [`executor`] - the cache-aside + remote + fallback façade
//! - [`stats`] - execution counters and the operational metrics report

pub mod executor;
pub mod fallback;
pub mod request;
pub mod stats;

pub use executor::{
    ExecutionOutcome, OutcomeError, ResultSource, ToolDescriptor, ToolExecutionBridge,
};
pub use fallback::{FallbackHandler, FallbackRegistry};
pub use request::{MemorySearchParams, TimeParams, ToolRequest, WeatherParams};
pub use stats::{
    ExecutionStats, ExecutionStatsSnapshot, HealthReport, MetricsReport, ToolRegistryReport,
    HEALTHY_SUCCESS_RATE,
};

//! # relay-transport
//!
//! Pooled HTTP transport to the Relay backend tool service:
//! - `ConnectionPool`: bounded, reusable connections with layered timeouts
//! - `ResponseEnvelope`: every call returns data, never an unwinding error
//! - `with_retry`: exponential backoff for idempotent calls
//! - `PoolMetrics`: per-pool counters and derived rates

pub mod error;
pub mod metrics;
pub mod pool;
pub mod retry;

pub use error::TransportError;
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};
pub use pool::{ConnectionPool, ResponseEnvelope, API_KEY_HEADER};
pub use retry::{with_retry, RetryConfig};

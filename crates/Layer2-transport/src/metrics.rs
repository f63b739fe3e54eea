//! Connection pool metrics
//!
//! Lock-free counters updated on every request; `snapshot()` derives the
//! average latency and success rate for operational reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::TransportError;

/// Atomic counters for one connection pool
#[derive(Debug, Default)]
pub struct PoolMetrics {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    connection_errors: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.success.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &TransportError, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        if error.is_timeout() {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        if error.is_connection() {
            self.connection_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Point-in-time snapshot with derived rates
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let success = self.success.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency_ms = if total > 0 {
            total_latency_ms as f64 / total as f64
        } else {
            0.0
        };
        let success_rate = if total > 0 {
            success as f64 / total as f64 * 100.0
        } else {
            100.0
        };

        PoolMetricsSnapshot {
            total_requests: total,
            successes: success,
            failures: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            total_latency_ms,
            avg_latency_ms,
            success_rate,
        }
    }
}

/// Serializable pool metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetricsSnapshot {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    pub total_latency_ms: u64,
    /// Average request latency in milliseconds
    pub avg_latency_ms: f64,
    /// Success percentage (0-100); 100 when no requests have been made
    pub success_rate: f64,
}

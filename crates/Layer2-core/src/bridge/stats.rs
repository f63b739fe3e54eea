//! Bridge execution statistics and the operational metrics report

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use relay_foundation::CacheStoreStats;
use relay_transport::PoolMetricsSnapshot;

/// Remote success rate below which the bridge reports unhealthy (percent)
pub const HEALTHY_SUCCESS_RATE: f64 = 80.0;

/// Monotonic counters for the execution façade
#[derive(Debug, Default)]
pub struct ExecutionStats {
    api_calls: AtomicU64,
    fallback_calls: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_execution_ms: AtomicU64,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_call(&self) {
        self.fallback_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_time(&self, elapsed: Duration) {
        self.total_execution_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Point-in-time snapshot with derived rates
    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total_requests = cache_hits + cache_misses;

        let hit_rate = if total_requests > 0 {
            cache_hits as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        let avg_execution_ms = if total_requests > 0 {
            self.total_execution_ms.load(Ordering::Relaxed) as f64 / total_requests as f64
        } else {
            0.0
        };
        let error_rate = if total_requests > 0 {
            errors as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        let success_rate = if total_requests > 0 {
            (total_requests - errors) as f64 / total_requests as f64 * 100.0
        } else {
            100.0
        };

        ExecutionStatsSnapshot {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            fallback_calls: self.fallback_calls.load(Ordering::Relaxed),
            errors,
            cache_hits,
            cache_misses,
            total_requests,
            cache_hit_rate: hit_rate,
            total_execution_ms: self.total_execution_ms.load(Ordering::Relaxed),
            avg_execution_ms,
            success_rate,
            error_rate,
        }
    }
}

/// Serializable execution counters
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatsSnapshot {
    pub api_calls: u64,
    pub fallback_calls: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// `cache_hits + cache_misses`
    pub total_requests: u64,
    /// Cache hit percentage over all executions (0-100)
    pub cache_hit_rate: f64,
    pub total_execution_ms: u64,
    pub avg_execution_ms: f64,
    /// Percentage of executions that reached a successful terminal state
    /// (0-100); 100 when nothing has run yet
    pub success_rate: f64,
    /// Terminal-error percentage over all executions (0-100)
    pub error_rate: f64,
}

/// Aggregate operational report consumed by monitoring tooling
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub http_client: PoolMetricsSnapshot,
    pub tool_registry: ToolRegistryReport,
    pub cache_system: CacheStoreStats,
    pub overall_health: HealthReport,
}

/// Fallback registry portion of the metrics report
#[derive(Debug, Clone, Serialize)]
pub struct ToolRegistryReport {
    pub registered_fallbacks: Vec<String>,
    pub execution: ExecutionStatsSnapshot,
}

/// Aggregate health verdict
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// Remote success percentage from the connection pool (0-100)
    pub remote_success_rate: f64,
    pub cache_within_budget: bool,
    pub as_of: DateTime<Utc>,
}

impl HealthReport {
    /// Healthy only when the remote success rate clears the threshold and
    /// the cache sits within its budgets.
    pub fn evaluate(pool: &PoolMetricsSnapshot, cache_within_budget: bool) -> Self {
        Self {
            healthy: pool.success_rate > HEALTHY_SUCCESS_RATE && cache_within_budget,
            remote_success_rate: pool.success_rate,
            cache_within_budget,
            as_of: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_consistency() {
        let stats = ExecutionStats::new();

        stats.record_cache_miss();
        stats.record_api_call();
        stats.record_execution_time(Duration::from_millis(40));

        stats.record_cache_hit();
        stats.record_execution_time(Duration::from_millis(2));

        stats.record_cache_miss();
        stats.record_api_call();
        stats.record_fallback_call();
        stats.record_execution_time(Duration::from_millis(30));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, snap.cache_hits + snap.cache_misses);
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.api_calls, 2);
        assert_eq!(snap.fallback_calls, 1);
        assert_eq!(snap.errors, 0);
        assert!((snap.cache_hit_rate - (1.0 / 3.0 * 100.0)).abs() < 0.01);
        assert!((snap.avg_execution_ms - 24.0).abs() < 0.01);
        assert!((snap.success_rate - 100.0).abs() < 0.01);
        assert!((snap.error_rate - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_health_thresholds() {
        let good = PoolMetricsSnapshot {
            total_requests: 10,
            successes: 9,
            failures: 1,
            timeouts: 0,
            connection_errors: 1,
            total_latency_ms: 100,
            avg_latency_ms: 10.0,
            success_rate: 90.0,
        };
        assert!(HealthReport::evaluate(&good, true).healthy);
        assert!(!HealthReport::evaluate(&good, false).healthy);

        let degraded = PoolMetricsSnapshot {
            success_rate: 50.0,
            ..good
        };
        assert!(!HealthReport::evaluate(&degraded, true).healthy);
    }
}

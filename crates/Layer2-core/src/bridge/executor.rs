//! Tool execution bridge
//!
//! The single entry point calling code uses. Per call:
//!
//! ```text
//! RECEIVE -> CACHE_LOOKUP -> HIT:  return cached
//!                         -> MISS: REMOTE_CALL -> SUCCESS: cache + return
//!                                              -> FAILURE: LOCAL_FALLBACK
//!                                                 -> AVAILABLE:   cache + return
//!                                                 -> UNAVAILABLE: structured error
//! ```
//!
//! `execute` never raises: every terminal state produces a well-formed
//! outcome carrying a success flag, a payload or structured error, and a
//! `fallback_used` flag, so orchestration above can retry, report, or pick
//! another tool without unwinding through the cache and pool internals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use relay_foundation::{
    CacheStore, Error, RelayConfig, Result, NS_API_RESPONSES, NS_TOOL_RESULTS,
};
use relay_transport::{with_retry, ConnectionPool, ResponseEnvelope, RetryConfig, TransportError};

use super::fallback::{FallbackHandler, FallbackRegistry};
use super::request::ToolRequest;
use super::stats::{ExecutionStats, ExecutionStatsSnapshot, HealthReport, MetricsReport, ToolRegistryReport};

const EXECUTE_PATH: &str = "/api/v1/tools/execute";
const LIST_PATH: &str = "/api/v1/tools/list";

/// Where a successful payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Remote,
    Fallback,
}

/// Structured error carried inside an outcome
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeError {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for OutcomeError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Terminal result of one `execute` call
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub payload: Option<Value>,
    pub error: Option<OutcomeError>,
    pub fallback_used: bool,
    pub source: Option<ResultSource>,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    fn succeeded(payload: Value, source: ResultSource) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            fallback_used: source == ResultSource::Fallback,
            source: Some(source),
            duration_ms: 0,
        }
    }

    fn failed(error: &Error, fallback_used: bool) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(OutcomeError::from(error)),
            fallback_used,
            source: None,
            duration_ms: 0,
        }
    }

    fn stamped(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }
}

/// A tool advertised by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Caching, fallback-capable façade over the backend tool service
pub struct ToolExecutionBridge {
    cache: Arc<CacheStore>,
    pool: Arc<ConnectionPool>,
    fallbacks: FallbackRegistry,
    stats: ExecutionStats,
    list_retry: RetryConfig,
    list_cache_ttl: Duration,
}

impl ToolExecutionBridge {
    /// Build a bridge, its cache, and its pool from one config
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let cache = Arc::new(CacheStore::new(&config.cache));
        let pool = Arc::new(ConnectionPool::new(&config.backend, &config.pool)?);
        Ok(Self::with_parts(cache, pool, config))
    }

    /// Build a bridge from externally-owned parts (dependency injection)
    pub fn with_parts(cache: Arc<CacheStore>, pool: Arc<ConnectionPool>, config: &RelayConfig) -> Self {
        Self {
            cache,
            pool,
            fallbacks: FallbackRegistry::new(),
            stats: ExecutionStats::new(),
            list_retry: RetryConfig::default(),
            list_cache_ttl: config.cache.ttl(),
        }
    }

    /// The cache this bridge writes results into
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    // ========================================================================
    // Fallback registration
    // ========================================================================

    /// Register an in-process substitute used when the remote call fails
    pub fn register_fallback(&self, tool_name: &str, handler: Arc<dyn FallbackHandler>) {
        self.fallbacks.register(tool_name, handler);
    }

    /// Register a closure as a fallback
    pub fn register_fallback_fn<F>(&self, tool_name: &str, f: F)
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.fallbacks.register_fn(tool_name, f);
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute a tool call. Never returns an `Err`; failures are data.
    pub async fn execute(&self, request: &ToolRequest) -> ExecutionOutcome {
        let started = Instant::now();
        let call_id = Uuid::new_v4();
        let tool = request.tool_name();

        let params = match request.parameters() {
            Ok(params) => params,
            Err(e) => {
                self.stats.record_error();
                return ExecutionOutcome::failed(&e, false).stamped(started);
            }
        };

        // CACHE_LOOKUP
        if let Some(cached) = self.cache.get(NS_TOOL_RESULTS, tool, &params) {
            self.stats.record_cache_hit();
            debug!(%call_id, tool, "cache hit");
            let outcome = ExecutionOutcome::succeeded(cached, ResultSource::Cache).stamped(started);
            self.stats.record_execution_time(started.elapsed());
            return outcome;
        }
        self.stats.record_cache_miss();

        // REMOTE_CALL
        self.stats.record_api_call();
        let body = json!({"tool_name": tool, "parameters": params});
        let envelope = self.pool.post_json(EXECUTE_PATH, &body).await;

        let outcome = match Self::interpret_execute(envelope) {
            Ok(data) => {
                self.cache
                    .set(NS_TOOL_RESULTS, tool, &params, data.clone(), None);
                debug!(%call_id, tool, "remote execution ok");
                ExecutionOutcome::succeeded(data, ResultSource::Remote)
            }
            Err(remote_err) => {
                warn!(%call_id, tool, error = %remote_err, "remote execution failed, trying fallback");
                self.run_fallback(tool, &params, &remote_err).await
            }
        };

        self.stats.record_execution_time(started.elapsed());
        outcome.stamped(started)
    }

    /// Execute several tool calls concurrently
    pub async fn execute_many(&self, requests: &[ToolRequest]) -> Vec<ExecutionOutcome> {
        join_all(requests.iter().map(|request| self.execute(request))).await
    }

    // LOCAL_FALLBACK
    async fn run_fallback(&self, tool: &str, params: &Value, remote_err: &Error) -> ExecutionOutcome {
        let Some(handler) = self.fallbacks.get(tool) else {
            let error = Error::FallbackUnavailable(tool.to_string());
            warn!(tool, remote_error = %remote_err, "no fallback registered");
            self.stats.record_error();
            return ExecutionOutcome::failed(&error, false);
        };

        match handler.invoke(params).await {
            Ok(value) => {
                // Same cache, same TTL policy as remote results, so a
                // backend outage does not recompute the fallback per call
                self.cache
                    .set(NS_TOOL_RESULTS, tool, params, value.clone(), None);
                self.stats.record_fallback_call();
                debug!(tool, "fallback produced result");
                ExecutionOutcome::succeeded(value, ResultSource::Fallback)
            }
            Err(e) => {
                warn!(tool, error = %e, "fallback failed");
                self.stats.record_error();
                ExecutionOutcome::failed(&e, true)
            }
        }
    }

    fn interpret_execute(envelope: ResponseEnvelope) -> Result<Value> {
        let status = envelope.status.unwrap_or(0);
        let body = envelope.into_result().map_err(Error::from)?;

        match body.get("success").and_then(Value::as_bool) {
            Some(true) => Ok(body.get("data").cloned().unwrap_or(Value::Null)),
            Some(false) => {
                let message = body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("backend reported failure")
                    .to_string();
                Err(Error::remote(status, message))
            }
            None => Err(Error::remote(status, "response missing success field")),
        }
    }

    // ========================================================================
    // Tool listing
    // ========================================================================

    /// List tools advertised by the backend, optionally by category.
    ///
    /// Listings are cached under the API-response namespace and the GET is
    /// retried (it is idempotent, unlike execute).
    pub async fn list_tools(&self, category: Option<&str>) -> Result<Vec<ToolDescriptor>> {
        let cache_params = json!({"category": category});
        if let Some(cached) = self.cache.get(NS_API_RESPONSES, "tools_list", &cache_params) {
            match serde_json::from_value(cached) {
                Ok(tools) => return Ok(tools),
                Err(e) => {
                    // Prefer a miss over an inconsistent cache
                    debug!(error = %e, "cached tool listing unreadable, refetching");
                    self.cache
                        .invalidate_key(NS_API_RESPONSES, "tools_list", &cache_params);
                }
            }
        }

        let query: Vec<(&str, &str)> = match category {
            Some(c) => vec![("category", c)],
            None => Vec::new(),
        };

        let body = with_retry(&self.list_retry, "tools_list", || async {
            self.pool.get(LIST_PATH, &query).await.into_result()
        })
        .await
        .map_err(|e: TransportError| Error::from(e))?;

        let tools: Vec<ToolDescriptor> = match body.get("tools") {
            Some(tools) => serde_json::from_value(tools.clone())?,
            None => return Err(Error::remote(200, "listing missing tools field")),
        };

        self.cache.set(
            NS_API_RESPONSES,
            "tools_list",
            &cache_params,
            serde_json::to_value(&tools)?,
            Some(self.list_cache_ttl),
        );
        Ok(tools)
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Execution counters
    pub fn stats(&self) -> ExecutionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Nested operational report: http client, tool registry, cache, health
    pub fn metrics_report(&self) -> MetricsReport {
        let http_client = self.pool.metrics();
        let cache_within_budget = self.cache.within_budget();
        let overall_health = HealthReport::evaluate(&http_client, cache_within_budget);

        MetricsReport {
            http_client,
            tool_registry: ToolRegistryReport {
                registered_fallbacks: self.fallbacks.names(),
                execution: self.stats.snapshot(),
            },
            cache_system: self.cache.stats(),
            overall_health,
        }
    }
}

impl std::fmt::Debug for ToolExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutionBridge")
            .field("backend", &self.pool.base_url())
            .field("fallbacks", &self.fallbacks.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(status: u16, body: Value) -> ResponseEnvelope {
        ResponseEnvelope {
            ok: true,
            status: Some(status),
            body: Some(body),
            error: None,
        }
    }

    #[test]
    fn test_interpret_success_body() {
        let data =
            ToolExecutionBridge::interpret_execute(envelope(200, json!({"success": true, "data": 7})))
                .unwrap();
        assert_eq!(data, json!(7));
    }

    #[test]
    fn test_interpret_success_without_data_is_null() {
        let data =
            ToolExecutionBridge::interpret_execute(envelope(200, json!({"success": true}))).unwrap();
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn test_interpret_reported_failure() {
        let err = ToolExecutionBridge::interpret_execute(envelope(
            200,
            json!({"success": false, "error": "tool crashed"}),
        ))
        .unwrap_err();
        match err {
            Error::Remote { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "tool crashed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_interpret_malformed_body() {
        let err =
            ToolExecutionBridge::interpret_execute(envelope(200, json!({"data": 1}))).unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }
}

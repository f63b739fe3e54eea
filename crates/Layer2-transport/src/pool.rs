//! Pooled HTTP client for the backend tool service
//!
//! One `ConnectionPool` talks to one base URL over a bounded, reusable
//! connection pool with layered timeouts. Every call returns a
//! `ResponseEnvelope`; network failures, timeouts, and non-2xx statuses are
//! all data (`ok = false`), never an error that unwinds through the caller.
//! The pool carries no caching or fallback logic.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use relay_foundation::{BackendConfig, ConnectionPoolConfig, Error, Result};

use crate::error::TransportError;
use crate::metrics::{PoolMetrics, PoolMetricsSnapshot};

/// Header carrying the backend API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Typed result of one backend call
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// True only for a 2xx response with a parseable JSON body
    pub ok: bool,
    /// HTTP status, when a response was received at all
    pub status: Option<u16>,
    /// Parsed JSON body, when one was received
    pub body: Option<Value>,
    /// Structured failure, set iff `ok` is false
    pub error: Option<TransportError>,
}

impl ResponseEnvelope {
    fn success(status: u16, body: Value) -> Self {
        Self {
            ok: true,
            status: Some(status),
            body: Some(body),
            error: None,
        }
    }

    fn failure(error: TransportError) -> Self {
        Self {
            ok: false,
            status: error.status(),
            body: None,
            error: Some(error),
        }
    }

    /// Convert into a `Result`, for use with the retry helper
    pub fn into_result(self) -> std::result::Result<Value, TransportError> {
        if self.ok {
            Ok(self.body.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| TransportError::PoolUnavailable("empty envelope".to_string())))
        }
    }
}

/// Pooled HTTP transport to one backend base URL
pub struct ConnectionPool {
    client: reqwest::Client,
    base_url: String,
    /// Bounds concurrent in-flight requests across all callers
    inflight: Arc<Semaphore>,
    metrics: PoolMetrics,
}

impl ConnectionPool {
    /// Build a pool from backend and pool configuration
    pub fn new(backend: &BackendConfig, config: &ConnectionPoolConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&backend.user_agent)
                .map_err(|e| Error::Config(format!("invalid user agent: {e}")))?,
        );
        if !backend.api_key.is_empty() {
            let mut key = HeaderValue::from_str(&backend.api_key)
                .map_err(|e| Error::Config(format!("invalid API key: {e}")))?;
            key.set_sensitive(true);
            headers.insert(API_KEY_HEADER, key);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(config.max_per_host)
            .pool_idle_timeout(config.keepalive())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .timeout(config.total_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            inflight: Arc::new(Semaphore::new(config.max_total)),
            metrics: PoolMetrics::new(),
        })
    }

    /// POST a JSON body to a path under the base URL
    pub async fn post_json(&self, path: &str, body: &Value) -> ResponseEnvelope {
        let url = self.url(path);
        let request = self.client.post(&url).json(body);
        self.dispatch("POST", &url, request).await
    }

    /// GET a path under the base URL with query parameters
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> ResponseEnvelope {
        let url = self.url(path);
        let request = self.client.get(&url).query(query);
        self.dispatch("GET", &url, request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn dispatch(
        &self,
        method: &str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> ResponseEnvelope {
        let permit = match self.inflight.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let error = TransportError::PoolUnavailable("pool closed".to_string());
                return ResponseEnvelope::failure(error);
            }
        };

        let start = Instant::now();
        let envelope = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(text) => Self::interpret(status, &text),
                    Err(e) => ResponseEnvelope::failure(TransportError::from_reqwest(&e)),
                }
            }
            Err(e) => ResponseEnvelope::failure(TransportError::from_reqwest(&e)),
        };
        let elapsed = start.elapsed();
        drop(permit);

        match &envelope.error {
            None => {
                self.metrics.record_success(elapsed);
                debug!(method, url, status = envelope.status, elapsed_ms = elapsed.as_millis() as u64, "backend call ok");
            }
            Some(error) => {
                self.metrics.record_failure(error, elapsed);
                warn!(method, url, %error, elapsed_ms = elapsed.as_millis() as u64, "backend call failed");
            }
        }

        envelope
    }

    fn interpret(status: u16, text: &str) -> ResponseEnvelope {
        if (200..300).contains(&status) {
            match serde_json::from_str::<Value>(text) {
                Ok(body) => ResponseEnvelope::success(status, body),
                Err(e) => ResponseEnvelope::failure(TransportError::InvalidResponse {
                    status,
                    message: e.to_string(),
                }),
            }
        } else {
            ResponseEnvelope::failure(TransportError::from_http_status(status, text))
        }
    }

    /// Current pool metrics
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Base URL this pool is bound to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool_for(url: &str) -> ConnectionPool {
        let backend = BackendConfig {
            base_url: url.to_string(),
            api_key: "test-key".to_string(),
            ..Default::default()
        };
        ConnectionPool::new(&backend, &ConnectionPoolConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_post_success_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/tools/execute")
            .match_header(API_KEY_HEADER, "test-key")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"success": true, "data": "12:00:00"}"#)
            .create_async()
            .await;

        let pool = pool_for(&server.url());
        let envelope = pool
            .post_json("/api/v1/tools/execute", &json!({"tool_name": "get_current_time"}))
            .await;

        mock.assert_async().await;
        assert!(envelope.ok);
        assert_eq!(envelope.status, Some(200));
        assert_eq!(envelope.body.unwrap()["data"], json!("12:00:00"));

        let metrics = pool.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.successes, 1);
    }

    #[tokio::test]
    async fn test_server_error_is_data_not_panic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/tools/execute")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let pool = pool_for(&server.url());
        let envelope = pool.post_json("/api/v1/tools/execute", &json!({})).await;

        assert!(!envelope.ok);
        assert_eq!(envelope.status, Some(503));
        assert!(matches!(
            envelope.error,
            Some(TransportError::Server { status: 503, .. })
        ));
        assert_eq!(pool.metrics().failures, 1);
    }

    #[tokio::test]
    async fn test_connection_refused_classified() {
        // Port 9 (discard) is closed in test environments
        let pool = pool_for("http://127.0.0.1:9");
        let envelope = pool.post_json("/api/v1/tools/execute", &json!({})).await;

        assert!(!envelope.ok);
        assert!(envelope.status.is_none());
        let error = envelope.error.unwrap();
        assert!(error.is_connection() || error.is_timeout());

        let metrics = pool.metrics();
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.connection_errors + metrics.timeouts, 1);
    }

    #[tokio::test]
    async fn test_non_json_2xx_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/tools/list")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let pool = pool_for(&server.url());
        let envelope = pool.get("/api/v1/tools/list", &[]).await;

        assert!(!envelope.ok);
        assert!(matches!(
            envelope.error,
            Some(TransportError::InvalidResponse { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_get_passes_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/tools/list")
            .match_query(mockito::Matcher::UrlEncoded(
                "category".into(),
                "memory".into(),
            ))
            .with_status(200)
            .with_body(r#"{"tools": []}"#)
            .create_async()
            .await;

        let pool = pool_for(&server.url());
        let envelope = pool.get("/api/v1/tools/list", &[("category", "memory")]).await;

        mock.assert_async().await;
        assert!(envelope.ok);
    }
}

//! Transport-specific error types
//!
//! `TransportError` covers everything that can go wrong between the pool
//! and the backend. It converts into `relay_foundation::Error` at the
//! bridge boundary.

use std::time::Duration;

use relay_foundation::Error as FoundationError;
use thiserror::Error;

/// Errors produced by the connection pool
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection-level failure (refused, reset, DNS)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Any of the layered timeouts fired
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Backend returned 5xx
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Backend returned a non-2xx, non-5xx status
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Rate limited (429)
    #[error("Rate limited{}", .retry_after_ms.map(|ms| format!(", retry after {ms}ms")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    /// 2xx response whose body was not valid JSON
    #[error("Invalid response body ({status}): {message}")]
    InvalidResponse { status: u16, message: String },

    /// Pool shut down or otherwise unusable
    #[error("Pool unavailable: {0}")]
    PoolUnavailable(String),
}

impl TransportError {
    /// Classify a failed reqwest call
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if err.is_decode() {
            TransportError::InvalidResponse {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        } else {
            TransportError::Connection(err.to_string())
        }
    }

    /// Classify a non-2xx HTTP status
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 512);
        match status {
            429 => TransportError::RateLimited {
                retry_after_ms: extract_retry_after(body),
            },
            500..=599 => TransportError::Server { status, message },
            _ => TransportError::Rejected { status, message },
        }
    }

    /// HTTP status associated with this error, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Server { status, .. }
            | TransportError::Rejected { status, .. }
            | TransportError::InvalidResponse { status, .. } => Some(*status),
            TransportError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether this failure counts as a timeout in pool metrics
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }

    /// Whether this failure counts as a connection error in pool metrics
    pub fn is_connection(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }

    /// Whether a retry of the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_)
                | TransportError::Timeout(_)
                | TransportError::Server { .. }
                | TransportError::RateLimited { .. }
        )
    }

    /// Server-provided wait before the next attempt, for rate limits
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Try to extract a retry-after hint from a 429 body (milliseconds)
fn extract_retry_after(body: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("error")
        .and_then(|e| e.get("retry_after"))
        .or_else(|| json.get("retry_after"))
        .and_then(|v| v.as_f64())
        .map(|secs| (secs * 1000.0) as u64)
}

// ============================================================================
// Foundation error conversion
// ============================================================================

impl From<TransportError> for FoundationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connection(msg) => FoundationError::Network(msg),
            TransportError::Timeout(msg) => FoundationError::Timeout(msg),
            TransportError::Server { status, message }
            | TransportError::Rejected { status, message }
            | TransportError::InvalidResponse { status, message } => {
                FoundationError::Remote { status, message }
            }
            TransportError::RateLimited { retry_after_ms } => FoundationError::Remote {
                status: 429,
                message: retry_after_ms
                    .map(|ms| format!("rate limited, retry after {ms}ms"))
                    .unwrap_or_else(|| "rate limited".to_string()),
            },
            TransportError::PoolUnavailable(msg) => FoundationError::Network(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            TransportError::from_http_status(503, "down"),
            TransportError::Server { status: 503, .. }
        ));
        assert!(matches!(
            TransportError::from_http_status(404, "nope"),
            TransportError::Rejected { status: 404, .. }
        ));
        assert!(matches!(
            TransportError::from_http_status(429, "{\"retry_after\": 1.5}"),
            TransportError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Connection("refused".into()).is_transient());
        assert!(TransportError::Timeout("read".into()).is_transient());
        assert!(TransportError::from_http_status(500, "boom").is_transient());
        assert!(!TransportError::from_http_status(400, "bad").is_transient());
        assert!(!TransportError::PoolUnavailable("closed".into()).is_transient());
    }

    #[test]
    fn test_retry_hint_only_from_rate_limits() {
        let limited = TransportError::from_http_status(429, "{\"retry_after\": 2}");
        assert_eq!(limited.retry_hint(), Some(Duration::from_millis(2000)));

        assert_eq!(TransportError::Timeout("read".into()).retry_hint(), None);
        assert_eq!(
            TransportError::RateLimited {
                retry_after_ms: None
            }
            .retry_hint(),
            None
        );
    }

    #[test]
    fn test_foundation_conversion() {
        let err: FoundationError = TransportError::Timeout("total".into()).into();
        assert!(matches!(err, FoundationError::Timeout(_)));

        let err: FoundationError = TransportError::from_http_status(502, "gw").into();
        assert!(matches!(err, FoundationError::Remote { status: 502, .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "ééééé";
        let t = truncate(s, 3);
        assert!(t.starts_with("é"));
    }
}

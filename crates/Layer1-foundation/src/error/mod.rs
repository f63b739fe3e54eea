//! Error types for Relay
//!
//! All bridge-layer errors are managed centrally. The bridge boundary turns
//! these into structured results; nothing below it panics on a failed call.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Relay error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Transport
    // ========================================================================
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    // ========================================================================
    // Cache
    // ========================================================================
    #[error("Cache error: {0}")]
    Cache(String),

    // ========================================================================
    // Resources
    // ========================================================================
    #[error("Construction failed: {key} - {message}")]
    Construction { key: String, message: String },

    // ========================================================================
    // Bridge
    // ========================================================================
    #[error("No fallback registered for tool: {0}")]
    FallbackUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the operation that produced this error may succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) => true,
            Error::Remote { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Whether the bridge may substitute a local fallback for this error
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout(_) | Error::Remote { .. }
        )
    }

    /// Remote error helper
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Error::Remote {
            status,
            message: message.into(),
        }
    }

    /// Construction error helper
    pub fn construction(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Construction {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used in structured execution results
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::Remote { .. } => "remote",
            Error::Cache(_) => "cache",
            Error::Construction { .. } => "construction",
            Error::FallbackUnavailable(_) => "fallback_unavailable",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Internal(_) => "internal",
        }
    }
}

// ============================================================================
// From impls (additional conversions)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("connection refused".into()).is_retryable());
        assert!(Error::Timeout("read".into()).is_retryable());
        assert!(Error::remote(503, "unavailable").is_retryable());
        assert!(Error::remote(429, "slow down").is_retryable());
        assert!(!Error::remote(400, "bad request").is_retryable());
        assert!(!Error::InvalidRequest("missing field".into()).is_retryable());
    }

    #[test]
    fn test_fallback_eligibility() {
        assert!(Error::Network("dns".into()).is_fallback_eligible());
        assert!(Error::remote(500, "boom").is_fallback_eligible());
        assert!(!Error::InvalidRequest("bad".into()).is_fallback_eligible());
        assert!(!Error::Cache("oversize".into()).is_fallback_eligible());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(Error::remote(502, "gw").kind(), "remote");
        assert_eq!(
            Error::FallbackUnavailable("get_weather".into()).kind(),
            "fallback_unavailable"
        );
    }
}

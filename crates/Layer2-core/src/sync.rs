//! Blocking adapter for non-async callers
//!
//! The bridge is async-first; this adapter sits at the process boundary for
//! callers outside the scheduler. It dispatches onto an existing runtime and
//! blocks with an upper-bound timeout rather than indefinitely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;

use crate::bridge::{ExecutionOutcome, OutcomeError, ToolExecutionBridge, ToolRequest};

/// Default upper bound on a blocking call
const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(15);

/// Synchronous façade over a shared [`ToolExecutionBridge`]
///
/// Must be used from a thread that is not driving the async scheduler.
#[derive(Debug, Clone)]
pub struct BlockingBridge {
    inner: Arc<ToolExecutionBridge>,
    handle: Handle,
    timeout: Duration,
}

impl BlockingBridge {
    /// Wrap a bridge with a handle to the runtime that will drive its calls
    pub fn new(inner: Arc<ToolExecutionBridge>, handle: Handle) -> Self {
        Self {
            inner,
            handle,
            timeout: DEFAULT_BLOCKING_TIMEOUT,
        }
    }

    /// Override the blocking upper-bound timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute a tool call, blocking the current thread.
    ///
    /// Exceeding the upper-bound timeout yields a structured timeout
    /// outcome, mirroring the async contract: no panics, errors are data.
    pub fn execute(&self, request: &ToolRequest) -> ExecutionOutcome {
        let started = Instant::now();
        let result = self.handle.block_on(async {
            tokio::time::timeout(self.timeout, self.inner.execute(request)).await
        });

        match result {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome {
                success: false,
                payload: None,
                error: Some(OutcomeError {
                    kind: "timeout".to_string(),
                    message: format!(
                        "blocking execute exceeded {}ms",
                        self.timeout.as_millis()
                    ),
                }),
                fallback_used: false,
                source: None,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_foundation::RelayConfig;

    #[test]
    fn test_blocking_execute_from_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let mut config = RelayConfig::minimal();
        // Closed port: the remote call fails fast and the fallback serves
        config.backend.base_url = "http://127.0.0.1:9".to_string();

        let bridge = Arc::new(ToolExecutionBridge::new(&config).unwrap());
        bridge.register_fallback_fn("get_current_time", |_| Ok(serde_json::json!("12:00:00")));

        let blocking = BlockingBridge::new(bridge, runtime.handle().clone());
        let request = ToolRequest::parse("get_current_time", serde_json::Value::Null).unwrap();
        let outcome = blocking.execute(&request);

        assert!(outcome.success);
        assert!(outcome.fallback_used);
        assert_eq!(outcome.payload, Some(serde_json::json!("12:00:00")));
    }

    #[test]
    fn test_blocking_timeout_is_structured() {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let mut config = RelayConfig::minimal();
        // Non-routable address: connect hangs until the connect timeout,
        // which is longer than our blocking bound below
        config.backend.base_url = "http://10.255.255.1:80".to_string();

        let bridge = Arc::new(ToolExecutionBridge::new(&config).unwrap());
        let blocking = BlockingBridge::new(bridge, runtime.handle().clone())
            .with_timeout(Duration::from_millis(50));

        let request = ToolRequest::parse("get_current_time", serde_json::Value::Null).unwrap();
        let outcome = blocking.execute(&request);

        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().kind, "timeout");
    }
}

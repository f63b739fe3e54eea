//! Backoff for idempotent backend calls
//!
//! The only retried operation is the tool-listing GET; execute requests are
//! never retried, the bridge fails them over to local fallbacks instead. The
//! helper is therefore specific to [`TransportError`]: the error itself
//! decides whether another attempt makes sense, and rate-limit responses
//! carry their own wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::TransportError;

/// Backoff schedule for retried calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts allowed after the first try
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Ceiling on any single delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Spread delays out so callers do not retry in lockstep
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-indexed), absent a rate-limit
    /// hint from the server.
    fn backoff(&self, attempt: u32) -> Duration {
        let grown = self
            .initial_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay);
        if self.jitter {
            // Up to 25% extra, sourced from the subsecond clock
            grown + grown.mul_f64(clock_fraction() * 0.25)
        } else {
            grown
        }
    }
}

/// Pseudo-random fraction in [0, 1) from the subsecond clock
fn clock_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

/// Run a backend call, retrying transient transport failures.
///
/// Rate-limited calls wait out the server's hint when it provides one;
/// everything else backs off exponentially. Permanent failures and an
/// exhausted budget both surface the last error to the caller.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0;
    let err = loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = err.retry_hint().unwrap_or_else(|| config.backoff(attempt));
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => break err,
        }
    };

    warn!(operation = operation_name, attempts = attempt + 1, error = %err, "giving up");
    Err(err)
}

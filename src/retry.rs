//! Rate-limit-aware retry with exponential backoff.
//!
//! Remote AI services throttle aggressively and do not report throttling in a
//! consistent shape, so detection is a loose heuristic over the error text.

use crate::error::{BasarError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Substrings that mark an error as a rate-limit signal.
const RATE_LIMIT_MARKERS: &[&str] = &["quota", "exhausted", "429", "limit"];

/// Backoff configuration for one kind of remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial call.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the wait after every retry.
    pub backoff_factor: f64,
    /// Exclusive upper bound of the random jitter added to every wait.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor: 1.5,
            max_jitter: Duration::from_millis(2_000),
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    fn jitter(&self) -> Duration {
        let bound = self.max_jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

/// Whether an error looks like the remote service throttling us.
pub fn is_rate_limited(err: &BasarError) -> bool {
    match err {
        BasarError::RateLimited(_) => true,
        BasarError::Service {
            status: Some(429), ..
        } => true,
        // Decode/parse failures are produced locally and never mean throttling.
        BasarError::MalformedResponse(_) | BasarError::MalformedAudio(_) => false,
        other => {
            let text = format!("{} {:?}", other, other).to_lowercase();
            RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker))
        }
    }
}

/// Run `operation`, retrying rate-limited failures with backoff.
///
/// Non-rate-limit errors are returned immediately. When the retry budget is
/// spent the last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries_left = policy.max_retries;
    let mut delay = policy.initial_delay;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if retries_left > 0 && is_rate_limited(&err) => {
                let wait = delay + policy.jitter();
                warn!(
                    "{} was rate limited, waiting {:.1}s before retrying ({} retries left): {}",
                    label,
                    wait.as_secs_f64(),
                    retries_left,
                    err
                );
                tokio::time::sleep(wait).await;
                delay = delay.mul_f64(policy.backoff_factor);
                retries_left -= 1;
            }
            Err(err) => return Err(err),
        }
    }
}

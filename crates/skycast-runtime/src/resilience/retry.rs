//! Bounded exponential-backoff retry for transient upstream failures.
//!
//! Only errors that report themselves [`Transient`] are retried. The delay
//! before retry `n` is `min(base_interval * multiplier^(n-1), max_interval)`,
//! with no jitter. Sleeping goes through tokio so other tasks keep running.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use skycast_core::Upstream;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Classifies an error as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retry configuration for one upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_tries: u32,

    #[serde(with = "crate::config::duration_str")]
    pub base_interval: Duration,

    #[serde(with = "crate::config::duration_str")]
    pub max_interval: Duration,

    pub multiplier: f32,
}

impl RetryConfig {
    /// 3 tries, 0.5s base, 2s cap.
    pub fn geocoding() -> Self {
        Self {
            max_tries: 3,
            base_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    /// 2 tries, 0.5s base, 1s cap. Timezone is advisory, so it gives up early.
    pub fn timezone() -> Self {
        Self {
            max_tries: 2,
            base_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    /// 3 tries, 0.5s base, 2s cap.
    pub fn weather() -> Self {
        Self::geocoding()
    }

    /// Delay slept before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.base_interval.as_secs_f64() * f64::from(self.multiplier).powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Upper bound on total time spent sleeping between attempts.
    pub fn max_total_delay(&self) -> Duration {
        (1..self.max_tries).map(|n| self.delay_for_attempt(n)).sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::geocoding()
    }
}

/// One scheduled retry, handed to the observer before sleeping.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub upstream: Upstream,
    /// 1-based number of the retry about to happen
    pub retry: u32,
    pub max_tries: u32,
    pub delay: Duration,
    pub error: String,
}

/// Callback invoked for every scheduled retry.
pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

fn log_retry(event: &RetryEvent) {
    tracing::warn!(
        upstream = %event.upstream,
        retry = event.retry,
        max_tries = event.max_tries,
        delay = ?event.delay,
        error = %event.error,
        "Retrying upstream call"
    );
}

/// Retry executor for one upstream.
#[derive(Clone)]
pub struct RetryPolicy {
    upstream: Upstream,
    config: RetryConfig,
    observer: RetryObserver,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("upstream", &self.upstream)
            .field("config", &self.config)
            .finish()
    }
}

impl RetryPolicy {
    /// Create a policy that logs each retry through `tracing`.
    pub fn new(upstream: Upstream, config: RetryConfig) -> Self {
        Self {
            upstream,
            config,
            observer: Arc::new(log_retry),
        }
    }

    /// Replace the retry observer.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.base_interval)
            .with_max_delay(self.config.max_interval)
            .with_factor(self.config.multiplier)
            .with_max_times(self.config.max_tries.saturating_sub(1) as usize)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of
    /// tries. The last error is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Transient + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retry = 0u32;
        let upstream = self.upstream;
        let max_tries = self.config.max_tries;
        let observer = Arc::clone(&self.observer);

        operation
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(|e: &E| e.is_transient())
            .notify(|e: &E, delay: Duration| {
                retry += 1;
                observer(&RetryEvent {
                    upstream,
                    retry,
                    max_tries,
                    delay,
                    error: e.to_string(),
                });
            })
            .await
    }
}

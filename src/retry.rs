// Retry wrapper for AI backend calls: capped exponential backoff with jitter

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, UpstreamError, classify};
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_RETRIES};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    // retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    // jitter ceiling as a fraction of the backoff delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter_ratio: 0.3,
        }
    }
}

impl RetryPolicy {
    // min(base * 2^attempt, max)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let delay = base.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    // delay plus a uniform draw from [0, jitter_ratio * delay]
    pub fn with_jitter<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let ms = delay.as_millis() as u64;
        let ceiling = (ms as f64 * self.jitter_ratio) as u64;
        let jitter = if ceiling == 0 { 0 } else { rng.gen_range(0..=ceiling) };
        Duration::from_millis(ms + jitter)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.with_jitter(self.backoff_delay(attempt), &mut rand::thread_rng())
    }
}

// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// One failed try within a single logical call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    // 0-based
    pub attempt: u32,
    pub error: Option<UpstreamError>,
    // wait before the next try; None when no further try was made
    pub delay: Option<Duration>,
}

pub struct RetryClient {
    operation: &'static str,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryClient {
    pub fn new(operation: &'static str, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            operation,
            policy,
            sleeper,
        }
    }

    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.call_with_history(op).await.0
    }

    // Also returns every failed attempt in order
    pub async fn call_with_history<T, F, Fut>(
        &self,
        mut op: F,
    ) -> (Result<T, GatewayError>, Vec<RetryAttempt>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut history = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            debug!(operation = self.operation, attempt, "calling upstream");

            let err = match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation = self.operation, attempt, "upstream succeeded after retry");
                    }
                    return (Ok(value), history);
                }
                Err(err) => err,
            };

            let kind = classify(&err);

            if !kind.is_retryable() {
                UPSTREAM_FAILURES.with_label_values(&[kind.as_str()]).inc();
                warn!(operation = self.operation, attempt, %kind, error = %err, "upstream failed, not retrying");
                history.push(RetryAttempt {
                    attempt,
                    error: Some(err.clone()),
                    delay: None,
                });
                return (Err(GatewayError::Terminal { kind, source: err }), history);
            }

            if attempt >= self.policy.max_retries {
                UPSTREAM_FAILURES.with_label_values(&[kind.as_str()]).inc();
                error!(operation = self.operation, attempts = attempt + 1, %kind, error = %err, "upstream retries exhausted");
                history.push(RetryAttempt {
                    attempt,
                    error: Some(err.clone()),
                    delay: None,
                });
                return (
                    Err(GatewayError::RetriesExhausted {
                        kind,
                        attempts: attempt + 1,
                        source: err,
                    }),
                    history,
                );
            }

            let delay = self.policy.delay_for(attempt);
            UPSTREAM_RETRIES.inc();
            warn!(
                operation = self.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %kind,
                error = %err,
                "upstream failed, retrying"
            );
            history.push(RetryAttempt {
                attempt,
                error: Some(err),
                delay: Some(delay),
            });

            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

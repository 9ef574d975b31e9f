use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::metrics::{RATE_LIMIT_FAIL_OPEN, RATE_LIMIT_REJECTED, RATE_LIMIT_REAPED};
use crate::store::{Decision, RateLimitStore, StoreError};

// Records untouched for this long are reaped by the janitor
pub const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);
// Max records deleted per sweep
pub const SWEEP_BATCH: usize = 100;

// Rate limit record - one per caller (or caller + endpoint) bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    pub caller_id: String,
    pub bucket: String,
    // chronological, milliseconds since epoch
    pub request_timestamps: Vec<i64>,
    pub last_cleanup_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub const TREATMENT_SUGGESTION: Self = Self {
        max_requests: 100,
        window_ms: 60_000,
    };
    pub const IMAGE_ANALYSIS: Self = Self {
        max_requests: 50,
        window_ms: 60_000,
    };
}

// How records are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RateLimitScope {
    // One bucket per caller and endpoint
    PerEndpoint,
    // One bucket per caller, every endpoint counts into it
    Shared,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rate limit of {limit} requests per {window_ms}ms exceeded")]
pub struct QuotaExceeded {
    pub limit: u32,
    pub window_ms: u64,
    pub in_window: usize,
}

// Keeps timestamps strictly newer than now - window; a full window rejects without a write
pub fn evaluate(
    existing: Option<&RateLimitRecord>,
    caller_id: &str,
    bucket: &str,
    now: i64,
    config: RateLimitConfig,
) -> Decision {
    // windows beyond i64 range cover all of time
    let window_ms = i64::try_from(config.window_ms).unwrap_or(i64::MAX);
    let window_start = now.saturating_sub(window_ms);

    let mut in_window: Vec<i64> = existing
        .map(|r| {
            r.request_timestamps
                .iter()
                .copied()
                .filter(|&t| t > window_start)
                .collect()
        })
        .unwrap_or_default();

    if in_window.len() >= config.max_requests as usize {
        return Decision::Reject {
            in_window: in_window.len(),
        };
    }

    in_window.push(now);
    Decision::Admit(RateLimitRecord {
        caller_id: caller_id.to_string(),
        bucket: bucket.to_string(),
        request_timestamps: in_window,
        last_cleanup_at: now,
    })
}

pub struct RateLimiter {
    endpoint: &'static str,
    config: RateLimitConfig,
    scope: RateLimitScope,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        endpoint: &'static str,
        config: RateLimitConfig,
        scope: RateLimitScope,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint,
            config,
            scope,
            store,
            clock,
        }
    }

    fn bucket(&self) -> &'static str {
        match self.scope {
            RateLimitScope::PerEndpoint => self.endpoint,
            RateLimitScope::Shared => "shared",
        }
    }

    pub fn key_for(&self, caller_id: &str) -> String {
        match self.scope {
            RateLimitScope::PerEndpoint => format!("{}:{}", caller_id, self.endpoint),
            RateLimitScope::Shared => caller_id.to_string(),
        }
    }

    // Store failures are logged and the request goes through
    pub async fn check(&self, caller_id: &str) -> Result<(), QuotaExceeded> {
        let now = self.clock.now_ms();
        let key = self.key_for(caller_id);
        let bucket = self.bucket();
        let config = self.config;

        let apply = |existing: Option<&RateLimitRecord>| {
            evaluate(existing, caller_id, bucket, now, config)
        };

        match self.store.transact(&key, &apply).await {
            Ok(Decision::Admit(_)) => Ok(()),
            Ok(Decision::Reject { in_window }) => {
                RATE_LIMIT_REJECTED.inc();
                warn!(
                    caller_id,
                    endpoint = self.endpoint,
                    request_count = in_window,
                    limit = config.max_requests,
                    "rate limit exceeded"
                );
                Err(QuotaExceeded {
                    limit: config.max_requests,
                    window_ms: config.window_ms,
                    in_window,
                })
            }
            Err(e) => {
                RATE_LIMIT_FAIL_OPEN.inc();
                error!(caller_id, endpoint = self.endpoint, error = %e, "rate limiter error, letting request through");
                Ok(())
            }
        }
    }
}

// Delete up to `limit` records not touched within `max_age`
pub async fn sweep_stale(
    store: &dyn RateLimitStore,
    clock: &dyn Clock,
    max_age: Duration,
    limit: usize,
) -> Result<usize, StoreError> {
    let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    let cutoff = clock.now_ms().saturating_sub(max_age_ms);

    let keys = store.find_stale(cutoff, limit).await?;
    if keys.is_empty() {
        return Ok(0);
    }

    let removed = store.delete_batch(&keys, cutoff).await?;
    info!(removed, "cleaned up old rate limit records");
    Ok(removed)
}

// Janitor - sweeps stale records on every tick
pub async fn janitor(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "rate limit janitor started");

    loop {
        interval.tick().await;

        match sweep_stale(store.as_ref(), clock.as_ref(), STALE_AFTER, SWEEP_BATCH).await {
            Ok(removed) => RATE_LIMIT_REAPED.inc_by(removed as f64),
            Err(e) => warn!(error = %e, "rate limit sweep failed"),
        }
    }
}

use std::time::Duration;

use clap::Parser;

use crate::rate_limit::{RateLimitConfig, RateLimitScope};
use crate::retry::RetryPolicy;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "woundcare-ai-gateway")]
#[command(about = "Rate limited, retrying gateway to the wound care AI assistant")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Base URL of the generative AI API
    #[arg(long, env = "AI_BASE_URL", default_value = "https://generativelanguage.googleapis.com")]
    pub upstream_url: String,

    // Model used for both endpoints
    #[arg(long, env = "AI_MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    // Without a key every AI call fails with failed-precondition
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Per-attempt upstream timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    // Treatment suggestions allowed per caller per window
    #[arg(long, default_value_t = 100)]
    pub treatment_rate_limit: u32,

    // Image analyses allowed per caller per window
    #[arg(long, default_value_t = 50)]
    pub image_rate_limit: u32,

    // Rate limit window in milliseconds
    #[arg(long, default_value_t = 60_000)]
    pub rate_window_ms: u64,

    // per-endpoint: separate quota per endpoint; shared: one quota per caller
    #[arg(long, value_enum, default_value_t = RateLimitScope::PerEndpoint)]
    pub rate_limit_scope: RateLimitScope,

    // Retries after the first upstream attempt
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    // First backoff delay for treatment suggestions (ms)
    #[arg(long, default_value_t = 1000)]
    pub treatment_base_delay_ms: u64,

    // First backoff delay for image analysis (ms)
    #[arg(long, default_value_t = 2000)]
    pub image_base_delay_ms: u64,

    // Backoff ceiling (ms)
    #[arg(long, default_value_t = 10_000)]
    pub max_delay_ms: u64,

    // Header carrying the authenticated caller id, set by the auth proxy
    #[arg(long, default_value = "x-caller-id")]
    pub caller_header: String,

    // How often stale rate limit records are swept
    #[arg(long, default_value_t = 3600)]
    pub janitor_interval_secs: u64,
}

impl Args {
    pub fn treatment_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.treatment_rate_limit,
            window_ms: self.rate_window_ms,
        }
    }

    pub fn image_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.image_rate_limit,
            window_ms: self.rate_window_ms,
        }
    }

    fn retry_policy(&self, base_delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn treatment_retry_policy(&self) -> RetryPolicy {
        self.retry_policy(self.treatment_base_delay_ms)
    }

    pub fn image_retry_policy(&self) -> RetryPolicy {
        self.retry_policy(self.image_base_delay_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    // Reject settings the limiter and retry loop cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.treatment_rate_limit == 0 || self.image_rate_limit == 0 {
            return Err("rate limits must be positive".to_string());
        }
        if self.rate_window_ms == 0 {
            return Err("rate window must be positive".to_string());
        }
        if i64::try_from(self.rate_window_ms).is_err() {
            return Err("rate window is too large".to_string());
        }
        if self.janitor_interval_secs == 0 {
            return Err("janitor interval must be positive".to_string());
        }
        if self.max_delay_ms < self.treatment_base_delay_ms.min(self.image_base_delay_ms) {
            return Err("max delay must not be below the base delays".to_string());
        }
        Ok(())
    }
}

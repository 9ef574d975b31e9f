use std::sync::Arc;

use axum::http::HeaderName;

use crate::clock::Clock;
use crate::config::Args;
use crate::handlers::{IMAGE_ENDPOINT, TREATMENT_ENDPOINT};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryClient, Sleeper};
use crate::store::RateLimitStore;
use crate::upstream::AiBackend;

// app's shared state
pub struct AppState {
    pub backend: Arc<dyn AiBackend>,
    pub treatment_limiter: RateLimiter,
    pub image_limiter: RateLimiter,
    pub treatment_retry: RetryClient,
    pub image_retry: RetryClient,
    pub caller_header: HeaderName,
}

impl AppState {
    pub fn new(
        args: &Args,
        backend: Arc<dyn AiBackend>,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, String> {
        let caller_header = HeaderName::try_from(args.caller_header.as_str())
            .map_err(|e| format!("invalid caller header {:?}: {}", args.caller_header, e))?;

        Ok(Self {
            backend,
            treatment_limiter: RateLimiter::new(
                TREATMENT_ENDPOINT,
                args.treatment_rate_limit(),
                args.rate_limit_scope,
                store.clone(),
                clock.clone(),
            ),
            image_limiter: RateLimiter::new(
                IMAGE_ENDPOINT,
                args.image_rate_limit(),
                args.rate_limit_scope,
                store,
                clock,
            ),
            treatment_retry: RetryClient::new(
                TREATMENT_ENDPOINT,
                args.treatment_retry_policy(),
                sleeper.clone(),
            ),
            image_retry: RetryClient::new(IMAGE_ENDPOINT, args.image_retry_policy(), sleeper),
            caller_header,
        })
    }
}

use std::sync::Arc;

use clap::Parser; // for cli
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use woundcare_ai_gateway::{
    clock::{Clock, SystemClock},
    config::Args,
    handlers::router,
    rate_limit::janitor,
    retry::TokioSleeper,
    state::AppState,
    store::{MemoryStore, RateLimitStore},
    upstream::GeminiClient,
};

// this is main async function with tokio
#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    if let Err(e) = args.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }
    if args.api_key.is_none() {
        tracing::warn!("No AI API key configured, AI requests will fail with failed-precondition");
    }

    let client = reqwest::Client::builder()
        .timeout(args.upstream_timeout())
        .build()
        .expect("Failed to build HTTP client");

    let backend = Arc::new(GeminiClient::new(
        client,
        &args.upstream_url,
        &args.model,
        args.api_key.clone(),
    ));
    let store: Arc<dyn RateLimitStore> = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = match AppState::new(&args, backend, store.clone(), clock.clone(), Arc::new(TokioSleeper)) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // spawn the stale record janitor
    tokio::spawn(janitor(store, clock, args.janitor_interval()));

    let app = router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tracing::info!("Gateway running on http://localhost:{}", args.port);
    tracing::info!("Forwarding to {} (model {})", args.upstream_url, args.model);
    tracing::info!(
        "Rate limits: {} treatment / {} image requests per {} ms ({:?})",
        args.treatment_rate_limit,
        args.image_rate_limit,
        args.rate_window_ms,
        args.rate_limit_scope
    );
    tracing::info!(
        "Retries: up to {} (max delay {} ms)",
        args.max_retries,
        args.max_delay_ms
    );

    axum::serve(listener, app).await.expect("Failed to start server");
}

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod caller;
mod health;
mod image;
mod metrics;
mod treatment;

pub use caller::Caller;
pub use health::health_handler;
pub use image::image_analysis_handler;
pub use metrics::metrics_handler;
pub use treatment::treatment_suggestion_handler;

pub const TREATMENT_ENDPOINT: &str = "treatment-suggestion";
pub const IMAGE_ENDPOINT: &str = "image-analysis";

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/treatment-suggestion", post(treatment_suggestion_handler))
        .route("/api/image-analysis", post(image_analysis_handler))
        .with_state(state)
}

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tracing::info;

use crate::error::GatewayError;
use crate::handlers::{Caller, IMAGE_ENDPOINT};
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{ImageAnalysis, ImageAnalysisRequest, InlineImage};
use crate::state::AppState;

pub async fn image_analysis_handler(
    State(state): State<Arc<AppState>>,
    Caller(caller_id): Caller,
    payload: Result<Json<ImageAnalysisRequest>, JsonRejection>,
) -> Result<Json<ImageAnalysis>, GatewayError> {
    REQUEST_TOTAL.with_label_values(&[IMAGE_ENDPOINT]).inc();

    let Json(req) = payload.map_err(|e| GatewayError::InvalidArgument(e.body_text()))?;

    if req.base64_image_url.trim().is_empty() {
        return Err(GatewayError::InvalidArgument("base64ImageUrl is required".to_string()));
    }
    let image = InlineImage::from_data_url(&req.base64_image_url)
        .ok_or_else(|| GatewayError::InvalidArgument("invalid image format".to_string()))?;

    state.image_limiter.check(&caller_id).await?;

    let start_time = Instant::now();

    let analysis = state
        .image_retry
        .call(|| state.backend.analyze_image(&image))
        .await?;

    let elapsed = start_time.elapsed();
    REQUEST_LATENCY
        .with_label_values(&[IMAGE_ENDPOINT])
        .observe(elapsed.as_secs_f64());
    info!(
        caller_id = %caller_id,
        mime_type = %image.mime_type,
        duration_ms = elapsed.as_millis() as u64,
        "wound image analyzed"
    );

    Ok(Json(analysis))
}

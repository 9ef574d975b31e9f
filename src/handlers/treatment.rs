use std::sync::Arc;
use std::time::Instant;

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tracing::info;

use crate::error::GatewayError;
use crate::handlers::{Caller, TREATMENT_ENDPOINT};
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{TreatmentRequest, TreatmentSuggestion};
use crate::state::AppState;

pub async fn treatment_suggestion_handler(
    State(state): State<Arc<AppState>>,
    Caller(caller_id): Caller,
    payload: Result<Json<TreatmentRequest>, JsonRejection>,
) -> Result<Json<TreatmentSuggestion>, GatewayError> {
    REQUEST_TOTAL.with_label_values(&[TREATMENT_ENDPOINT]).inc();

    let Json(req) = payload.map_err(|e| GatewayError::InvalidArgument(e.body_text()))?;

    state.treatment_limiter.check(&caller_id).await?;

    let start_time = Instant::now();

    let suggestion = state
        .treatment_retry
        .call(|| state.backend.suggest_treatment(&req))
        .await?;

    let elapsed = start_time.elapsed();
    REQUEST_LATENCY
        .with_label_values(&[TREATMENT_ENDPOINT])
        .observe(elapsed.as_secs_f64());
    info!(
        caller_id = %caller_id,
        lesion_id = %req.lesion.id,
        duration_ms = elapsed.as_millis() as u64,
        "treatment suggestion generated"
    );

    Ok(Json(suggestion))
}

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{UpstreamCode, UpstreamError};
use crate::models::{ImageAnalysis, InlineImage, TreatmentRequest, TreatmentSuggestion};
use crate::prompt::{
    IMAGE_ANALYSIS_PROMPT, IMAGE_ANALYSIS_TEMPERATURE, TREATMENT_TEMPERATURE,
    image_analysis_schema, treatment_prompt, treatment_schema,
};

// The generative AI service behind the gateway
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn suggest_treatment(
        &self,
        req: &TreatmentRequest,
    ) -> Result<TreatmentSuggestion, UpstreamError>;

    async fn analyze_image(&self, image: &InlineImage) -> Result<ImageAnalysis, UpstreamError>;
}

// generateContent request body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineImage>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn image(image: InlineImage) -> Self {
        Self {
            text: None,
            inline_data: Some(image),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl GenerateContentResponse {
    // Text of the first candidate, None when it is empty
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

// {"error": {"code": 503, "message": "...", "status": "UNAVAILABLE"}}
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// Statuses outside this table stay uncoded and are not retried, except 5xx
fn code_for_status(status: StatusCode) -> Option<UpstreamCode> {
    let code = match status {
        StatusCode::BAD_REQUEST => UpstreamCode::InvalidArgument,
        StatusCode::UNAUTHORIZED => UpstreamCode::Unauthenticated,
        StatusCode::FORBIDDEN => UpstreamCode::PermissionDenied,
        StatusCode::PRECONDITION_FAILED => UpstreamCode::FailedPrecondition,
        StatusCode::TOO_MANY_REQUESTS => UpstreamCode::ResourceExhausted,
        StatusCode::SERVICE_UNAVAILABLE => UpstreamCode::Unavailable,
        StatusCode::GATEWAY_TIMEOUT => UpstreamCode::DeadlineExceeded,
        s if s.is_server_error() => UpstreamCode::Internal,
        _ => return None,
    };
    Some(code)
}

// Build an UpstreamError from a non-2xx response
fn status_error(status: StatusCode, body: &str) -> UpstreamError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let code = UpstreamCode::parse(&env.error.status).or_else(|| code_for_status(status));
            let message = if env.error.message.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                format!("HTTP {}: {}", status.as_u16(), env.error.message)
            };
            UpstreamError { code, message }
        }
        Err(_) => UpstreamError {
            code: code_for_status(status),
            message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
        },
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::new(UpstreamCode::DeadlineExceeded, format!("AI request timed out: {}", e))
    } else if e.is_connect() {
        UpstreamError::new(UpstreamCode::Unavailable, format!("AI service unreachable: {}", e))
    } else {
        UpstreamError::new(UpstreamCode::Internal, format!("AI request failed: {}", e))
    }
}

// Gemini generateContent over REST
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        model: &str,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        parts: Vec<Part>,
        schema: Value,
        temperature: f64,
    ) -> Result<T, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                UpstreamError::new(UpstreamCode::FailedPrecondition, "AI API key not configured")
            })?;

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
                temperature,
            },
        };

        debug!(model = %self.model, "sending generateContent request");

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let response: GenerateContentResponse = res.json().await.map_err(|e| {
            UpstreamError::new(UpstreamCode::Internal, format!("Unreadable AI response: {}", e))
        })?;

        let text = response
            .text()
            .ok_or_else(|| UpstreamError::new(UpstreamCode::Internal, "No response from AI"))?;

        serde_json::from_str(&text).map_err(|e| {
            UpstreamError::new(UpstreamCode::Internal, format!("AI returned malformed JSON: {}", e))
        })
    }
}

#[async_trait]
impl AiBackend for GeminiClient {
    async fn suggest_treatment(
        &self,
        req: &TreatmentRequest,
    ) -> Result<TreatmentSuggestion, UpstreamError> {
        let mut parts = vec![Part::text(treatment_prompt(req))];

        // A photo that does not parse is left out rather than failing the request
        if let Some(image) = req
            .current_assessment
            .image_url
            .as_deref()
            .and_then(InlineImage::from_data_url)
        {
            parts.push(Part::image(image));
        }

        self.generate(parts, treatment_schema(), TREATMENT_TEMPERATURE)
            .await
    }

    async fn analyze_image(&self, image: &InlineImage) -> Result<ImageAnalysis, UpstreamError> {
        let parts = vec![Part::image(image.clone()), Part::text(IMAGE_ANALYSIS_PROMPT)];

        self.generate(parts, image_analysis_schema(), IMAGE_ANALYSIS_TEMPERATURE)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, classify};
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use serde_json::json;

    // Fake generateContent endpoint on a random local port
    async fn fake_gemini(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/v1beta/models/{action}",
            post(move |headers: HeaderMap, Json(req): Json<Value>| {
                let body = body.clone();
                async move {
                    assert_eq!(headers.get("x-goog-api-key").unwrap(), "secret");
                    assert_eq!(req["generationConfig"]["responseMimeType"], "application/json");
                    (status, Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn image() -> InlineImage {
        InlineImage {
            mime_type: "image/png".into(),
            data: "iVBORw0KGgo".into(),
        }
    }

    #[test]
    fn error_body_status_wins_over_http_status() {
        let body = r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, body);
        assert_eq!(err.code, Some(UpstreamCode::Unavailable));
        assert!(err.message.contains("overloaded"));

        let err = status_error(StatusCode::BAD_REQUEST, r#"{"error":{"message":"bad","status":"PERMISSION_DENIED"}}"#);
        assert_eq!(err.code, Some(UpstreamCode::PermissionDenied));
    }

    #[test]
    fn plain_error_body_falls_back_to_http_status() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.code, Some(UpstreamCode::ResourceExhausted));
        assert_eq!(err.message, "HTTP 429: slow down");

        let err = status_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.code, Some(UpstreamCode::Internal));
    }

    #[test]
    fn unmapped_client_statuses_fail_fast() {
        let body = r#"{"error":{"code":404,"message":"models/gemini-typo is not found","status":"NOT_FOUND"}}"#;
        let err = status_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.code, None);
        assert_eq!(classify(&err), FailureKind::Unknown);
        assert!(!classify(&err).is_retryable());

        let err = status_error(StatusCode::CONFLICT, "conflict");
        assert_eq!(err.code, None);
        assert!(!classify(&err).is_retryable());
    }

    #[test]
    fn empty_candidates_have_no_text() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(resp.text().is_none());

        let resp: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]})).unwrap();
        assert!(resp.text().is_none());
    }

    #[tokio::test]
    async fn missing_api_key_is_failed_precondition() {
        let client = GeminiClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "m", None);
        let err = client.analyze_image(&image()).await.unwrap_err();
        assert_eq!(err.code, Some(UpstreamCode::FailedPrecondition));
    }

    #[tokio::test]
    async fn parses_structured_image_analysis() {
        let analysis = json!({
            "tissueTypes": { "necrotic": 5, "slough": 15, "granulation": 70, "epithelialization": 10 },
            "exudate": "Low",
            "infectionSigns": [],
            "woundEdges": ["Maceration"],
            "periwoundSkin": ["Xerosis"],
            "notes": "Healthy granulation"
        });
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": analysis.to_string() }] } }]
        });
        let base = fake_gemini(StatusCode::OK, body).await;

        let client = GeminiClient::new(reqwest::Client::new(), &base, "gemini-2.5-flash", Some("secret".into()));
        let result = client.analyze_image(&image()).await.unwrap();

        assert_eq!(result.tissue_types.granulation, 70.0);
        assert_eq!(result.wound_edges, vec!["Maceration".to_string()]);
    }

    #[tokio::test]
    async fn overloaded_upstream_maps_to_unavailable() {
        let body = json!({"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}});
        let base = fake_gemini(StatusCode::SERVICE_UNAVAILABLE, body).await;

        let client = GeminiClient::new(reqwest::Client::new(), &base, "gemini-2.5-flash", Some("secret".into()));
        let err = client.analyze_image(&image()).await.unwrap_err();

        assert_eq!(err.code, Some(UpstreamCode::Unavailable));
    }

    #[tokio::test]
    async fn empty_model_answer_is_internal() {
        let base = fake_gemini(StatusCode::OK, json!({"candidates": []})).await;

        let client = GeminiClient::new(reqwest::Client::new(), &base, "gemini-2.5-flash", Some("secret".into()));
        let err = client.analyze_image(&image()).await.unwrap_err();

        assert_eq!(err.code, Some(UpstreamCode::Internal));
        assert_eq!(err.message, "No response from AI");
    }
}

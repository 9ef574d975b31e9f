use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::rate_limit::QuotaExceeded;

// Error codes an AI backend call can fail with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamCode {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    FailedPrecondition,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
}

impl UpstreamCode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamCode::Unauthenticated => "unauthenticated",
            UpstreamCode::PermissionDenied => "permission-denied",
            UpstreamCode::InvalidArgument => "invalid-argument",
            UpstreamCode::FailedPrecondition => "failed-precondition",
            UpstreamCode::Unavailable => "unavailable",
            UpstreamCode::DeadlineExceeded => "deadline-exceeded",
            UpstreamCode::ResourceExhausted => "resource-exhausted",
            UpstreamCode::Internal => "internal",
        }
    }

    // Accepts both "permission-denied" and gRPC style "PERMISSION_DENIED"
    pub fn parse(code: &str) -> Option<Self> {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        let code = match normalized.as_str() {
            "unauthenticated" => UpstreamCode::Unauthenticated,
            "permission-denied" => UpstreamCode::PermissionDenied,
            "invalid-argument" => UpstreamCode::InvalidArgument,
            "failed-precondition" => UpstreamCode::FailedPrecondition,
            "unavailable" => UpstreamCode::Unavailable,
            "deadline-exceeded" => UpstreamCode::DeadlineExceeded,
            "resource-exhausted" => UpstreamCode::ResourceExhausted,
            "internal" => UpstreamCode::Internal,
            _ => return None,
        };
        Some(code)
    }
}

// Failure reported by the AI backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub code: Option<UpstreamCode>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(code: UpstreamCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

// Internal failure categories; everything upstream-specific is mapped into these by `classify`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    FailedPrecondition,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Overloaded,
    Internal,
    Unknown,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Unavailable
                | FailureKind::DeadlineExceeded
                | FailureKind::ResourceExhausted
                | FailureKind::Overloaded
                | FailureKind::Internal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Unauthenticated => "unauthenticated",
            FailureKind::PermissionDenied => "permission-denied",
            FailureKind::InvalidArgument => "invalid-argument",
            FailureKind::FailedPrecondition => "failed-precondition",
            FailureKind::Unavailable => "unavailable",
            FailureKind::DeadlineExceeded => "deadline-exceeded",
            FailureKind::ResourceExhausted => "resource-exhausted",
            FailureKind::Overloaded => "overloaded",
            FailureKind::Internal => "internal",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Message fragments that mean the backend is struggling rather than refusing
const OVERLOAD_MARKERS: [&str; 3] = ["503", "500", "UNAVAILABLE"];

// Terminal codes win over anything in the message, then transient codes,
// then markers in the text. Anything left is Unknown and not retried.
pub fn classify(err: &UpstreamError) -> FailureKind {
    match err.code {
        Some(UpstreamCode::Unauthenticated) => return FailureKind::Unauthenticated,
        Some(UpstreamCode::PermissionDenied) => return FailureKind::PermissionDenied,
        Some(UpstreamCode::InvalidArgument) => return FailureKind::InvalidArgument,
        Some(UpstreamCode::FailedPrecondition) => return FailureKind::FailedPrecondition,
        Some(UpstreamCode::Unavailable) => return FailureKind::Unavailable,
        Some(UpstreamCode::DeadlineExceeded) => return FailureKind::DeadlineExceeded,
        Some(UpstreamCode::ResourceExhausted) => return FailureKind::ResourceExhausted,
        Some(UpstreamCode::Internal) | None => {}
    }

    let message = err.message.as_str();
    if message.contains("RESOURCE_EXHAUSTED") {
        return FailureKind::ResourceExhausted;
    }
    if message.contains("DEADLINE_EXCEEDED") {
        return FailureKind::DeadlineExceeded;
    }
    if OVERLOAD_MARKERS.iter().any(|m| message.contains(m))
        || message.to_ascii_lowercase().contains("overloaded")
    {
        return FailureKind::Overloaded;
    }

    match err.code {
        Some(UpstreamCode::Internal) => FailureKind::Internal,
        _ => FailureKind::Unknown,
    }
}

// Errors returned to HTTP callers
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error("upstream call failed ({kind}): {source}")]
    Terminal { kind: FailureKind, source: UpstreamError },

    #[error("upstream call failed after {attempts} attempts ({kind}): {source}")]
    RetriesExhausted {
        kind: FailureKind,
        attempts: u32,
        source: UpstreamError,
    },
}

impl GatewayError {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            GatewayError::Terminal { kind, .. } | GatewayError::RetriesExhausted { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }

    // Short machine-readable category for the response body
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::InvalidArgument(_) => "invalid-argument",
            GatewayError::QuotaExceeded(_) => "rate-limited",
            GatewayError::Terminal { kind, .. } | GatewayError::RetriesExhausted { kind, .. } => {
                kind.as_str()
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GatewayError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Terminal { kind, .. } | GatewayError::RetriesExhausted { kind, .. } => {
                match kind {
                    FailureKind::Unauthenticated => StatusCode::UNAUTHORIZED,
                    FailureKind::PermissionDenied => StatusCode::FORBIDDEN,
                    FailureKind::InvalidArgument => StatusCode::BAD_REQUEST,
                    FailureKind::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
                    FailureKind::Unavailable | FailureKind::Overloaded => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    FailureKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
                    FailureKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
                    FailureKind::Internal | FailureKind::Unknown => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            }
        }
    }

    // Text shown to the end user
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Unauthenticated => {
                "You must be signed in to use AI features.".to_string()
            }
            GatewayError::InvalidArgument(reason) => format!("Invalid request: {}.", reason),
            GatewayError::QuotaExceeded(q) => format!(
                "Too many requests: limit of {} per {} seconds reached. Wait a moment and try again.",
                q.limit,
                q.window_ms / 1000
            ),
            GatewayError::Terminal { kind, source }
            | GatewayError::RetriesExhausted { kind, source, .. } => match kind {
                FailureKind::Overloaded | FailureKind::Unavailable => {
                    "The AI service is temporarily overloaded. Try again shortly.".to_string()
                }
                FailureKind::DeadlineExceeded => {
                    "The AI service timed out. Try again.".to_string()
                }
                FailureKind::ResourceExhausted => {
                    "AI usage quota exceeded. Wait before retrying.".to_string()
                }
                FailureKind::Unauthenticated => {
                    "You must be signed in to use AI features.".to_string()
                }
                FailureKind::PermissionDenied => {
                    "You do not have permission to access this resource.".to_string()
                }
                FailureKind::InvalidArgument => format!("Invalid request: {}.", source.message),
                FailureKind::FailedPrecondition => {
                    "The AI service is not configured. Contact the administrator.".to_string()
                }
                FailureKind::Internal | FailureKind::Unknown => {
                    format!("AI request failed: {}", source.message)
                }
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            code: self.code(),
            message: self.user_message(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coded(code: UpstreamCode) -> UpstreamError {
        UpstreamError::new(code, "boom")
    }

    #[test]
    fn terminal_codes_are_not_retryable() {
        for code in [
            UpstreamCode::Unauthenticated,
            UpstreamCode::PermissionDenied,
            UpstreamCode::InvalidArgument,
            UpstreamCode::FailedPrecondition,
        ] {
            assert!(!classify(&coded(code)).is_retryable(), "{:?}", code);
        }
    }

    #[test]
    fn transient_codes_are_retryable() {
        for code in [
            UpstreamCode::Unavailable,
            UpstreamCode::DeadlineExceeded,
            UpstreamCode::ResourceExhausted,
            UpstreamCode::Internal,
        ] {
            assert!(classify(&coded(code)).is_retryable(), "{:?}", code);
        }
    }

    #[test]
    fn terminal_code_beats_overload_text() {
        let err = UpstreamError::new(UpstreamCode::InvalidArgument, "model overloaded (503)");
        assert_eq!(classify(&err), FailureKind::InvalidArgument);
    }

    #[test]
    fn overload_markers_in_message() {
        for msg in [
            "The model is overloaded. Please try again later.",
            "got HTTP 503 from upstream",
            "status 500",
            "UNAVAILABLE: backend unreachable",
        ] {
            assert_eq!(classify(&UpstreamError::uncoded(msg)), FailureKind::Overloaded, "{msg}");
        }
        let internal = UpstreamError::new(UpstreamCode::Internal, "Model Overloaded");
        assert_eq!(classify(&internal), FailureKind::Overloaded);
    }

    #[test]
    fn resource_exhausted_text_is_quota() {
        let err = UpstreamError::uncoded("429 RESOURCE_EXHAUSTED: quota");
        assert_eq!(classify(&err), FailureKind::ResourceExhausted);
    }

    #[test]
    fn unknown_failures_fail_fast() {
        let err = UpstreamError::uncoded("something odd happened");
        assert_eq!(classify(&err), FailureKind::Unknown);
        assert!(!FailureKind::Unknown.is_retryable());
    }

    #[test]
    fn parses_both_code_spellings() {
        assert_eq!(UpstreamCode::parse("permission-denied"), Some(UpstreamCode::PermissionDenied));
        assert_eq!(UpstreamCode::parse("RESOURCE_EXHAUSTED"), Some(UpstreamCode::ResourceExhausted));
        assert_eq!(UpstreamCode::parse("teapot"), None);
        assert_eq!(UpstreamCode::Unavailable.as_str(), "unavailable");
    }

    #[test]
    fn quota_and_overload_messages_differ() {
        let quota = GatewayError::from(QuotaExceeded {
            limit: 50,
            window_ms: 60_000,
            in_window: 50,
        });
        let overloaded = GatewayError::RetriesExhausted {
            kind: FailureKind::Overloaded,
            attempts: 4,
            source: UpstreamError::uncoded("overloaded"),
        };

        assert_eq!(quota.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(quota.user_message().contains("50 per 60 seconds"));
        assert_eq!(overloaded.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(overloaded.user_message().contains("overloaded"));
        assert_ne!(quota.user_message(), overloaded.user_message());
    }

    #[test]
    fn unknown_failure_message_includes_cause() {
        let err = GatewayError::RetriesExhausted {
            kind: FailureKind::Internal,
            attempts: 4,
            source: UpstreamError::new(UpstreamCode::Internal, "bad gateway config"),
        };
        assert!(err.user_message().contains("bad gateway config"));
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn deadline_maps_to_gateway_timeout() {
        let err = GatewayError::RetriesExhausted {
            kind: FailureKind::DeadlineExceeded,
            attempts: 4,
            source: UpstreamError::new(UpstreamCode::DeadlineExceeded, "slow"),
        };
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.user_message().contains("timed out"));
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::AgentError;

pub const TIMEOUT_MESSAGE: &str = "⚠️ Timeout: il modello non ha risposto in tempo.";
pub const CAPABILITY_MESSAGE: &str = "⚠️ Errore: il modello non è al momento disponibile.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge"),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UnsupportedMediaType")
            }
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
            ApiError::LlmError(_) => (StatusCode::SERVICE_UNAVAILABLE, "LlmError"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }

        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::Timeout(msg)
            | ApiError::LlmError(msg)
            | ApiError::InternalError(msg) => msg,
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            // capability details stay in the logs, the user gets a generic string
            AgentError::ExternalCapability(detail) => {
                tracing::error!("Capability failure: {}", detail);
                ApiError::LlmError(CAPABILITY_MESSAGE.to_string())
            }
            AgentError::Timeout(_) => ApiError::Timeout(TIMEOUT_MESSAGE.to_string()),
            AgentError::UnsupportedInput(msg) => ApiError::BadRequest(msg),
            AgentError::Storage(msg) | AgentError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_mapping() {
        let timeout: ApiError = AgentError::Timeout(30).into();
        assert!(matches!(timeout, ApiError::Timeout(ref m) if m == TIMEOUT_MESSAGE));

        let capability: ApiError = AgentError::ExternalCapability("connection refused".into()).into();
        match capability {
            ApiError::LlmError(msg) => assert!(!msg.contains("connection refused")),
            other => panic!("unexpected mapping: {:?}", other),
        }

        let bad: ApiError = AgentError::UnsupportedInput("empty message".into()).into();
        assert!(matches!(bad, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::UnsupportedMediaType("x".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (ApiError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (ApiError::LlmError("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}

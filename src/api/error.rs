use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::client::ClientError;

/// Error returned to HTTP callers as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    /// Wrap a runtime failure, adding a hint for the usual causes.
    pub fn upstream(err: &ClientError, model: &str, base_url: &str) -> Self {
        let message = err.to_string();
        let lower = message.to_lowercase();

        let detail = if err.is_transport() || lower.contains("connect") {
            format!("Could not connect to Ollama. Make sure Ollama is running at {base_url}. Original error: {message}")
        } else if lower.contains("model") && (lower.contains("not found") || lower.contains("does not exist")) {
            format!("Model '{model}' not found. Make sure the model is downloaded in Ollama. Original error: {message}")
        } else {
            message
        };
        ApiError::Upstream(detail)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_model_not_found_hint() {
        let err = ClientError::Upstream("model \"nope\" not found, try pulling it first".into());
        let api = ApiError::upstream(&err, "nope", "http://localhost:11434");
        assert!(api.to_string().starts_with("Model 'nope' not found."));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_transport_hint_names_base_url() {
        let err = ClientError::Timeout(Duration::from_secs(5));
        let api = ApiError::upstream(&err, "m", "http://gpu-box:11434");
        assert!(api.to_string().contains("running at http://gpu-box:11434"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = ClientError::Upstream("out of memory".into());
        assert_eq!(ApiError::upstream(&err, "m", "x").to_string(), "out of memory");
    }
}

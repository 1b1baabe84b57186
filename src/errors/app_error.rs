use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::core::error::SynthesisError;

/// Application error type
///
/// Rendered as an OpenAI-style body: `{"error": {"message", "type", "code"}}`.
#[derive(Debug)]
pub enum AppError {
    Synthesis(SynthesisError),
    BadRequest(String),
    Unauthorized(String),
    InternalServerError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Synthesis(err) => match err {
                SynthesisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                SynthesisError::CredentialUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                SynthesisError::Backend { .. } | SynthesisError::Transport(_) => {
                    StatusCode::BAD_GATEWAY
                }
                SynthesisError::StreamAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind_and_code(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Synthesis(err) => (err.category(), err.code()),
            AppError::BadRequest(_) => ("invalid_request_error", "invalid_request"),
            AppError::Unauthorized(_) => ("authentication_error", "invalid_api_key"),
            AppError::InternalServerError(_) => ("api_error", "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, code) = self.kind_and_code();

        let message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Synthesis(err) => {
                if status.is_server_error() {
                    tracing::error!(code, "Synthesis failed: {}", err);
                } else {
                    tracing::warn!(code, "Synthesis rejected: {}", err);
                }
                err.to_string()
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                msg.clone()
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                msg.clone()
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": kind,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Synthesis(err) => write!(f, "{err}"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<SynthesisError> for AppError {
    fn from(err: SynthesisError) -> Self {
        AppError::Synthesis(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<Box<dyn std::error::Error>> for AppError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_request_maps_to_400() {
        let (status, body) =
            body_json(SynthesisError::InvalidRequest("'input' must not be empty".into()).into())
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "invalid_request");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("'input' must not be empty")
        );
    }

    #[tokio::test]
    async fn test_upstream_errors_map_to_gateway_statuses() {
        let (status, body) = body_json(
            SynthesisError::Backend {
                status: 429,
                body: "slow down".into(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "synthesis_backend_error");

        let (status, _) =
            body_json(SynthesisError::CredentialUnavailable("down".into()).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) = body_json(AppError::InternalServerError("db password".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let (status, body) = body_json(AppError::Unauthorized("Missing bearer token".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
    }
}

use crate::errors::app_error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Identity of the caller, inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Configured id of the matching API secret, `None` when auth is disabled
    pub id: Option<String>,
}

/// Extract the bearer token from the `Authorization` header
fn extract_token(request: &Request) -> Result<&str, AppError> {
    let header = request
        .headers()
        .get("authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Expected a Bearer token".to_string()))
}

/// Authentication middleware that validates bearer tokens against configured API secrets
///
/// When auth is not required the request passes through with an empty
/// [`AuthContext`]. Otherwise the token must match one of the configured
/// secrets (constant-time comparison) or the request is rejected with 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.auth_required {
        tracing::debug!("Authentication disabled, inserting empty auth context");
        request.extensions_mut().insert(AuthContext { id: None });
        return Ok(next.run(request).await);
    }

    let request_method = request.method().to_string();
    let request_path = request.uri().path().to_string();

    let secret_id = {
        let token = extract_token(&request)?;
        state.config.find_api_secret_id(token).map(str::to_string)
    };

    match secret_id {
        Some(id) => {
            tracing::debug!(
                method = %request_method,
                path = %request_path,
                auth_id = %id,
                "API secret authentication successful"
            );
            request.extensions_mut().insert(AuthContext { id: Some(id) });
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!(
                method = %request_method,
                path = %request_path,
                "API secret authentication failed: token mismatch"
            );
            Err(AppError::Unauthorized("Invalid API key".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthApiSecret, ServerConfig};
    use axum::{Extension, Router, body::Body, body::to_bytes, http::StatusCode, routing::get};
    use tower::util::ServiceExt;

    async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
        auth.id.unwrap_or_else(|| "anonymous".to_string())
    }

    fn app(config: ServerConfig) -> Router {
        let state = AppState::new(config).unwrap();
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn_with_state(state, auth_middleware))
    }

    fn request(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_auth_passes_anonymous_context() {
        let response = app(ServerConfig::default()).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_matching_secret_sets_context_id() {
        let mut config = ServerConfig::default();
        config.auth_required = true;
        config.auth_api_secrets = vec![
            AuthApiSecret {
                id: "alpha".to_string(),
                secret: "sk-alpha".to_string(),
            },
            AuthApiSecret {
                id: "beta".to_string(),
                secret: "sk-beta".to_string(),
            },
        ];
        let app = app(config);

        let response = app.clone().oneshot(request(Some("sk-beta"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "beta");

        let response = app.oneshot(request(Some("sk-gamma"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

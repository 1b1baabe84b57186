use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{models, speech};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router with protected routes
///
/// Note: Authentication middleware should be applied in main.rs after state is available
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Protected routes (auth required when AUTH_REQUIRED=true)
        .route("/v1/audio/speech", post(speech::speech_handler))
        .route("/v1/models", get(models::list_models_handler))
        // Legacy form client endpoint
        .route("/generate", post(speech::generate_handler))
        .layer(TraceLayer::new_for_http())
}

pub mod api;

use std::sync::Arc;

use axum::{Router, middleware};
use http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Rates at or above this value disable the rate limiter entirely.
pub const RATE_LIMIT_DISABLED_AT: u32 = 100_000;

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [AUTHORIZATION, CONTENT_TYPE];

    match origins {
        Some("*") => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(false),
        Some(list) => {
            // Parse comma-separated origins
            let origins: Vec<_> = list
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(methods)
                .allow_headers(headers)
                .allow_credentials(true)
        }
        None => {
            info!(
                "CORS not configured, defaulting to same-origin only. \
                 Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
            );
            CorsLayer::new()
                .allow_methods(methods)
                .allow_headers(headers)
                .allow_credentials(false)
        }
    }
}

/// Assemble the full application: public health route, authenticated API
/// routes, CORS, rate limiting and security headers.
pub fn create_app(app_state: Arc<AppState>) -> Result<Router, Box<dyn std::error::Error>> {
    let rate_limit_rps = app_state.config.rate_limit_requests_per_second;
    let rate_limit_burst = app_state.config.rate_limit_burst_size;

    let protected_routes = api::create_api_router().layer(middleware::from_fn_with_state(
        app_state.clone(),
        auth_middleware,
    ));

    let public_routes = Router::new().route("/", axum::routing::get(handlers::api::health_check));

    let governor_layer = if rate_limit_rps < RATE_LIMIT_DISABLED_AT {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(u64::from(rate_limit_rps))
            .burst_size(rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or("Failed to build rate limiter config")?;
        Some(GovernorLayer::new(governor_config))
    } else {
        info!("Rate limiting disabled (rate >= {RATE_LIMIT_DISABLED_AT}/s)");
        None
    };

    let cors = cors_layer(app_state.config.cors_allowed_origins.as_deref());

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    Ok(public_routes
        .merge(protected_routes)
        .with_state(app_state)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers)
        // Outermost, so rate-limited and rejected responses carry CORS headers
        .layer(cors))
}

//! API layer - HTTP handlers and routing
//!
//! - `/accounts` registration, sessions and the student side of enrolled courses
//! - `/course` instructor course management, content editor, ordering, uploads
//! - `/`, `/courses`, `/course/{slug}` the public catalog
//! - `/api` read-only JSON API, Basic-authenticated enrollment, admin endpoints
//! - `/media` uploaded files

pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod manage;
pub mod middleware;
pub mod rest;
pub mod upload;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the application routes
pub fn build_app_router(state: AppState) -> Router<AppState> {
    let accounts = Router::new()
        .merge(accounts::public_router())
        .merge(accounts::protected_router().route_layer(
            axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth),
        ));

    let manage = Router::new()
        .merge(manage::router())
        .merge(upload::router(&state.upload_config))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Admin routes (need admin role)
    let admin = admin::router()
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let api = Router::new()
        .merge(rest::public_router())
        .merge(rest::basic_auth_router().route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_basic_auth,
        )))
        .nest("/admin", admin);

    Router::new()
        .merge(catalog::router())
        .nest("/accounts", accounts)
        .nest("/course", manage)
        .nest("/api", api)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let media = ServeDir::new(&state.upload_config.path);

    Router::new()
        .merge(build_app_router(state.clone()))
        .nest_service("/media", media)
        .layer(cors_layer(cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origin. Credentials are only allowed for an
/// explicit origin, never for `*`.
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    match origin.parse::<HeaderValue>() {
        Ok(value) if origin != "*" => cors.allow_origin(value).allow_credentials(true),
        Ok(_) => cors.allow_origin(Any),
        Err(_) => {
            tracing::warn!("Invalid CORS origin {:?}, allowing any origin", origin);
            cors.allow_origin(Any)
        }
    }
}

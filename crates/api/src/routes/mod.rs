//! API routes

pub mod calls;
pub mod chat;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{require_admin, require_staff},
    state::AppState,
    websocket::ws_handler,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (callers are anonymous) - under /api/v1
    let public_api_routes = Router::new()
        .route("/call-requests", post(calls::submit_call_request))
        .route("/call-requests/:id/feedback", post(calls::submit_feedback))
        .route("/chat/:connection_id/history", get(chat::history));

    let staff_api_routes = Router::new()
        .route("/call-requests/queue", get(calls::staff_queue))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_staff));

    let admin_api_routes = Router::new()
        .route("/admin/call-requests", get(calls::admin_list_calls))
        .route("/admin/call-requests/:id", delete(calls::admin_delete_call))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // WebSocket (auth happens during the upgrade, not via middleware)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(staff_api_routes)
        .merge(admin_api_routes)
        .merge(websocket_routes);

    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => base.allow_origin(origin),
        Some(Err(_)) => {
            tracing::warn!("CORS_ALLOWED_ORIGIN is not a valid header value, allowing any origin");
            base.allow_origin(Any)
        }
        None => base.allow_origin(Any),
    }
}

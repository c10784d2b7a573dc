//! API Routes
//!
//! Configures the Axum router: the worker's control endpoints under
//! `/__worker`, and a fallback that sends everything else through the worker.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    events_handler, health_handler, intercept_handler, message_handler, status_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /__worker/message` - Deliver a page message
/// - `GET /__worker/events` - Subscribe to worker messages (SSE)
/// - `GET /__worker/status` - Worker, generation and cache status
/// - `GET /__worker/health` - Health check endpoint
/// - anything else - Answered by the request interceptor
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__worker/message", post(message_handler))
        .route("/__worker/events", get(events_handler))
        .route("/__worker/status", get(status_handler))
        .route("/__worker/health", get(health_handler))
        .fallback(intercept_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

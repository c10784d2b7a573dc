//! API Module
//!
//! HTTP surface of the worker.
//!
//! # Endpoints
//! - `POST /__worker/message` - Deliver a `REFRESH_APP` or `SKIP_WAITING` message
//! - `GET /__worker/events` - Server-sent stream of worker messages
//! - `GET /__worker/status` - Worker and cache status
//! - `GET /__worker/health` - Health check endpoint
//! - Any other request - Routed through the request interceptor

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

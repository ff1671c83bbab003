use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::handlers::{health_handler, heartbeat_handler, AppState};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// # Routes
///
/// - `POST /heartbeat` - Throttled ticket / entitlement heartbeat for a bot
/// - `GET /health` - Service and database status
///
/// Every response passes through the request logging middleware and carries
/// an `X-Request-Id` header.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/heartbeat", post(heartbeat_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}

//! Request logging middleware and health reporting.
//!
//! Every request gets:
//! - a unique request id, echoed back in the `X-Request-Id` header
//! - a tracing span carrying the id, method and path
//! - a completion line with status and duration
//!
//! Heartbeat outcomes are logged as structured [`HeartbeatEvent`]s so a bot's
//! history can be followed by filtering on `bot_id`.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Things that can happen to a bot during one heartbeat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// A ticket request went through.
    TicketSucceeded,
    /// A ticket request was refused or never reached the validator.
    TicketFailed,
    /// The entitlement was re-validated.
    EntitlementSucceeded,
    /// The entitlement re-validation failed.
    EntitlementFailed,
    /// Nothing was due yet.
    Skipped,
    /// The bot's subscription ran out.
    Expired,
}

impl std::fmt::Display for HeartbeatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HeartbeatEvent::TicketSucceeded => "ticket_succeeded",
            HeartbeatEvent::TicketFailed => "ticket_failed",
            HeartbeatEvent::EntitlementSucceeded => "entitlement_succeeded",
            HeartbeatEvent::EntitlementFailed => "entitlement_failed",
            HeartbeatEvent::Skipped => "skipped",
            HeartbeatEvent::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

impl HeartbeatEvent {
    fn is_failure(self) -> bool {
        matches!(
            self,
            HeartbeatEvent::TicketFailed | HeartbeatEvent::EntitlementFailed | HeartbeatEvent::Expired
        )
    }
}

/// Log a heartbeat outcome for a bot.
///
/// Failures are logged at `warn`, everything else at `info`.
pub fn log_heartbeat_event(event: HeartbeatEvent, bot_id: &str, details: Option<&str>) {
    let span = info_span!(
        "heartbeat_event",
        event = %event,
        bot_id = %bot_id,
    );
    let _enter = span.enter();

    if event.is_failure() {
        if let Some(d) = details {
            warn!(reason = %d, "Heartbeat event occurred");
        } else {
            warn!("Heartbeat event occurred");
        }
    } else if let Some(d) = details {
        info!(details = %d, "Heartbeat event occurred");
    } else {
        info!("Heartbeat event occurred");
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and tags responses with a request id.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    /// sqlite or mysql
    pub db_type: String,
}

impl HealthResponse {
    pub fn new(db_connected: bool, db_type: &str) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "heartbeat-api".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}

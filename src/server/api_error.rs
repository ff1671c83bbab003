//! Error responses for the heartbeat endpoint.
//!
//! Rejections carry a status code and a `{"message": ...}` body the game
//! client shows to the user. Internal failures never surface as transport
//! errors: they are answered with `200 {"success": false, "message": "Internal server error"}`
//! so the client simply retries on its next tick.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::HeartbeatError;
use crate::server::handlers::HeartbeatResponse;
use crate::timestamps::display_utc;

/// Body of every non-200 heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// A request the handler refuses to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRejection {
    pub status: StatusCode,
    pub message: String,
}

impl ApiRejection {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// The client did not say which version it runs.
    pub fn client_outdated(expected: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("Client outdated, please update to v{expected}, download it from the panel."),
        )
    }

    /// The client runs a version other than the one this server speaks.
    pub fn version_mismatch(version: &str, expected: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!(
                "You are using outdated client v{version}, please update to v{expected}, download it from the panel."
            ),
        )
    }

    pub fn missing_fields() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Need to provide bot_id, sv_licenseKeyToken and cfxLicense",
        )
    }

    pub fn server_not_found(cfx_license: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("No server assigned / found for cfxLicense \"{cfx_license}\""),
        )
    }

    pub fn bot_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "No bot found with that id")
    }

    pub fn bot_expired(bot_id: &str, expire_on_ms: i64) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Bot {bot_id} expired on {}", display_utc(expire_on_ms)),
        )
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        let body = MessageBody {
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Anything that stops a heartbeat short of a `{success, message}` reply.
#[derive(Debug)]
pub enum HeartbeatFailure {
    Rejected(ApiRejection),
    Internal(HeartbeatError),
}

impl From<ApiRejection> for HeartbeatFailure {
    fn from(rejection: ApiRejection) -> Self {
        HeartbeatFailure::Rejected(rejection)
    }
}

impl From<HeartbeatError> for HeartbeatFailure {
    fn from(err: HeartbeatError) -> Self {
        HeartbeatFailure::Internal(err)
    }
}

impl IntoResponse for HeartbeatFailure {
    fn into_response(self) -> Response {
        match self {
            HeartbeatFailure::Rejected(rejection) => rejection.into_response(),
            HeartbeatFailure::Internal(_) => (
                StatusCode::OK,
                Json(HeartbeatResponse::failure("Internal server error")),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_messages_name_both_versions() {
        let rejection = ApiRejection::version_mismatch("0.0.9", "0.1.1");
        assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            rejection.message,
            "You are using outdated client v0.0.9, please update to v0.1.1, download it from the panel."
        );

        let missing = ApiRejection::client_outdated("0.1.1");
        assert!(missing.message.starts_with("Client outdated, please update to v0.1.1"));
    }

    #[test]
    fn not_found_names_the_license() {
        let rejection = ApiRejection::server_not_found("cfxk_abc");
        assert_eq!(rejection.status, StatusCode::NOT_FOUND);
        assert_eq!(
            rejection.message,
            "No server assigned / found for cfxLicense \"cfxk_abc\""
        );
    }

    #[test]
    fn expired_bot_is_a_server_error() {
        let rejection = ApiRejection::bot_expired("bot-1", 0);
        assert_eq!(rejection.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            rejection.message,
            "Bot bot-1 expired on 1970-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn internal_failures_answer_ok() {
        let response =
            HeartbeatFailure::Internal(HeartbeatError::DatabaseError("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

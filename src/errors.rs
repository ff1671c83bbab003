use thiserror::Error;

/// Errors raised inside the heartbeat service.
///
/// None of these reach the game client verbatim: the heartbeat handler logs
/// them and answers with a generic "Internal server error" body.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("server error: {0}")]
    ServerError(String),
}

pub type HeartbeatResult<T> = Result<T, HeartbeatError>;

impl From<sqlx::Error> for HeartbeatError {
    fn from(err: sqlx::Error) -> Self {
        HeartbeatError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for HeartbeatError {
    fn from(err: reqwest::Error) -> Self {
        HeartbeatError::NetworkError(err.to_string())
    }
}

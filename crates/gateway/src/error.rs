use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error kinds surfaced to operators through the HTTP boundary (spec §7).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("duplicated stream: {0}")]
    DuplicatedStream(String),

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid system time: {0}")]
    InvalidSystemTime(String),
}

impl GatewayError {
    pub fn invalid_uri(msg: impl Into<String>) -> Self {
        Self::InvalidUri(msg.into())
    }

    pub fn duplicated_stream(msg: impl Into<String>) -> Self {
        Self::DuplicatedStream(msg.into())
    }

    pub fn stream_not_found(msg: impl Into<String>) -> Self {
        Self::StreamNotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_system_time(msg: impl Into<String>) -> Self {
        Self::InvalidSystemTime(msg.into())
    }

    /// Machine-readable error kind, matching the names used in spec §7.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUri(_) => "invalid_uri",
            Self::DuplicatedStream(_) => "duplicated_stream",
            Self::StreamNotFound(_) => "stream_not_found",
            Self::Conflict(_) => "conflict",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage",
            Self::InvalidSystemTime(_) => "invalid_system_time",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::InvalidUri(_) => StatusCode::BAD_REQUEST,
            GatewayError::DuplicatedStream(_) => StatusCode::BAD_REQUEST,
            GatewayError::StreamNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidSystemTime(_) => StatusCode::CONFLICT,
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<sled::Error> for GatewayError {
    fn from(err: sled::Error) -> Self {
        GatewayError::storage(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::storage(format!("serialization error: {}", err))
    }
}

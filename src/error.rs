//! Errors returned by the feed resolver, the HTTP clients and the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A request parameter is missing or malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested station does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("Invalid train line: {0}")]
    UnknownLine(String),

    #[error("Invalid feed group: {0}")]
    UnknownFeedGroup(String),

    /// The feed configuration could not be loaded or is inconsistent.
    #[error("Failed to load MTA feed configuration: {0}")]
    Config(String),

    /// An upstream endpoint could not be reached, answered with a non-success
    /// status or sent a body that did not parse.
    #[error("upstream feed error: {0}")]
    Upstream(String),

    /// The feed body was not a valid GTFS Realtime message.
    #[error("failed to decode feed: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl Error {
    /// HTTP status the API answers with for this error.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UnknownLine(_) | Self::UnknownFeedGroup(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Decode(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.code();
        if status.is_server_error() {
            tracing::warn!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

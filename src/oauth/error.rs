//! OAuth protocol errors (RFC 6749 §5.2)

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the delegation flow.
///
/// Every variant renders as `{"error": ..., "error_description": ...}`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Client ID, client secret or state secret missing
    #[error("OAuth is not configured on this server")]
    NotConfigured,

    /// Malformed or missing request parameter
    #[error("{0}")]
    InvalidRequest(String),

    /// Authorization code or refresh token rejected
    #[error("{0}")]
    InvalidGrant(String),

    /// `grant_type` not supported
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Error code reported by Strava inside a successful response
    #[error("Upstream authorization server returned {error}")]
    Upstream {
        /// Upstream error code, forwarded verbatim
        error: String,
        /// Upstream description, logged but never sent to the client
        description: Option<String>,
    },
}

impl OAuthError {
    /// OAuth `error` code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NotConfigured => "server_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::Upstream { error, .. } => error,
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Human-readable description sent to the client
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Upstream { .. } => "Strava reported an authorization error".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn invalid_state() -> Self {
        Self::InvalidRequest("Invalid state parameter".to_string())
    }

    pub(crate) fn missing(param: &str) -> Self {
        Self::InvalidRequest(format!("Missing required parameter: {param}"))
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "error_description": self.description(),
        });
        (self.status(), Json(body)).into_response()
    }
}

//! Bearer token guard for `/mcp`
//!
//! The token is not validated here. It belongs to Strava and is passed
//! through unmodified; Strava rejects it if it is no good.

use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::router::AppState;
use crate::error::rpc_codes;
use crate::oauth::ProtectedResourceMetadata;
use crate::protocol::JsonRpcResponse;

/// Access token taken from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl FromRequestParts<Arc<AppState>> for BearerToken {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer);

        match token {
            Some(token) => Ok(Self(token.to_string())),
            None => {
                debug!(path = %parts.uri.path(), "Rejected request without bearer token");
                Err(unauthorized_response(&state.base_url(&parts.headers)))
            }
        }
    }
}

/// Extract the token from an `Authorization` value. The scheme is matched
/// case-insensitively; an empty token is rejected.
#[must_use]
pub fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// 401 with a JSON-RPC error body and a `WWW-Authenticate` challenge
/// pointing at the protected resource metadata
pub fn unauthorized_response(base_url: &str) -> Response {
    let challenge = format!(
        "Bearer resource_metadata=\"{}\"",
        ProtectedResourceMetadata::url_for(base_url)
    );
    let challenge =
        HeaderValue::from_str(&challenge).unwrap_or_else(|_| HeaderValue::from_static("Bearer"));

    let body = JsonRpcResponse::error(
        None,
        rpc_codes::UNAUTHORIZED,
        "Unauthorized: missing bearer token. Use: Authorization: Bearer <token>",
    );

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(body),
    )
        .into_response()
}

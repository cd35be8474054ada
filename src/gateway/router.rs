//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::mcp::{mcp_handler, method_not_allowed};
use crate::Result;
use crate::config::Config;
use crate::oauth::{
    AuthorizationServerMetadata, AuthorizeRequest, CallbackOutcome, CallbackRequest,
    DelegationFlow, ProtectedResourceMetadata, RegistrationRequest, TokenRequest, flow::now_millis,
};

/// Shared application state
pub struct AppState {
    /// Configured external base URL, if any
    pub public_url: Option<String>,
    /// Base URL used when the request carries no host information
    pub fallback_base_url: String,
    /// Scopes advertised in discovery documents
    pub scopes: Vec<String>,
    /// OAuth delegation flow
    pub flow: DelegationFlow,
    /// Shared HTTP client (connection pool for Strava)
    pub http: reqwest::Client,
    /// Strava API base URL
    pub strava_api_base: String,
}

impl AppState {
    /// Build state from configuration, resolving the OAuth secrets once
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.server.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let settings = config.oauth.resolve().map(Arc::new);
        if settings.is_none() {
            warn!(
                "OAuth not configured (client_id, client_secret and state_secret are required); \
                 /oauth endpoints will answer 500"
            );
        }

        Ok(Self {
            public_url: config.server.public_url.clone(),
            fallback_base_url: config.server.fallback_base_url(),
            scopes: config.oauth.scopes.clone(),
            flow: DelegationFlow::new(settings, http.clone()),
            http,
            strava_api_base: config.strava.api_base_url.clone(),
        })
    }

    /// External base URL for this request: the configured public URL, else
    /// `X-Forwarded-Proto`/`X-Forwarded-Host`/`Host`, else the bind address
    #[must_use]
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.clone();
        }

        let first = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let Some(host) = first("x-forwarded-host").or_else(|| first(header::HOST.as_str())) else {
            return self.fallback_base_url.clone();
        };
        let proto = first("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
        format!("{proto}://{host}")
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata_handler),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata_handler),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(protected_resource_metadata_handler),
        )
        .route("/oauth/register", post(register_handler))
        .route("/oauth/authorize", get(authorize_handler))
        .route("/oauth/callback", get(callback_handler))
        .route("/oauth/token", post(token_handler))
        .route(
            "/mcp",
            post(mcp_handler)
                .get(method_not_allowed)
                .delete(method_not_allowed),
        )
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Strava MCP Gateway is running. MCP endpoint: POST /mcp"
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "oauth_configured": state.flow.is_configured(),
    }))
}

async fn authorization_server_metadata_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<AuthorizationServerMetadata> {
    let base = state.base_url(&headers);
    Json(AuthorizationServerMetadata::for_gateway(&base, &state.scopes))
}

async fn protected_resource_metadata_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<ProtectedResourceMetadata> {
    let base = state.base_url(&headers);
    Json(ProtectedResourceMetadata::for_gateway(&base, &state.scopes))
}

async fn register_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = RegistrationRequest::from_body(&body);
    Json(state.flow.register(request, now_millis())).into_response()
}

async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let callback_url = format!("{}/oauth/callback", state.base_url(&headers));
    match state.flow.authorize(request, &callback_url, now_millis()) {
        Ok(location) => found(&location),
        Err(e) => e.into_response(),
    }
}

async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<CallbackRequest>,
) -> Response {
    match state.flow.callback(request, now_millis()) {
        Ok(CallbackOutcome::Redirect(location)) => found(&location),
        Ok(CallbackOutcome::Code(code)) => Json(json!({ "code": code })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn token_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let request = TokenRequest::from_body(content_type, &body);

    let mut response = match state.flow.token(&request).await {
        Ok(token) => {
            info!(token_type = %token.token_type, "Issued token");
            Json(token).into_response()
        }
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// 302 Found. Not `axum::response::Redirect`, which only offers 303/307/308.
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            warn!("Refusing to redirect to a location that is not a valid header value");
            crate::oauth::OAuthError::InvalidRequest("Invalid redirect_uri".to_string())
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(public_url: Option<&str>) -> AppState {
        let mut config = Config::default();
        config.server.public_url = public_url.map(str::to_string);
        config.oauth.client_id = None;
        AppState::from_config(&config).unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn public_url_wins() {
        let state = state(Some("https://mcp.example.com"));
        assert_eq!(
            state.base_url(&headers(&[("host", "internal:3000")])),
            "https://mcp.example.com"
        );
    }

    #[test]
    fn forwarded_headers_are_used() {
        let state = state(None);
        assert_eq!(
            state.base_url(&headers(&[
                ("host", "internal:3000"),
                ("x-forwarded-host", "mcp.example.com, proxy"),
                ("x-forwarded-proto", "https"),
            ])),
            "https://mcp.example.com"
        );
    }

    #[test]
    fn host_header_defaults_to_http() {
        let state = state(None);
        assert_eq!(
            state.base_url(&headers(&[("host", "localhost:8080")])),
            "http://localhost:8080"
        );
    }

    #[test]
    fn falls_back_to_bind_address() {
        let state = state(None);
        assert_eq!(state.base_url(&HeaderMap::new()), "http://127.0.0.1:3000");
    }

    #[test]
    fn missing_client_id_disables_oauth() {
        assert!(!state(None).flow.is_configured());
    }
}

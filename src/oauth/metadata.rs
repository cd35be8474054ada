//! OAuth discovery documents
//!
//! RFC 8414 (Authorization Server Metadata) and RFC 9728 (Protected Resource
//! Metadata), published for the gateway itself.

use serde::{Deserialize, Serialize};

/// Name advertised in the protected resource document
pub const RESOURCE_NAME: &str = "Strava MCP Gateway";

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Authorization server issuer URL
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Dynamic client registration endpoint
    pub registration_endpoint: String,

    /// Supported response types
    pub response_types_supported: Vec<String>,

    /// Supported grant types
    pub grant_types_supported: Vec<String>,

    /// Supported token endpoint auth methods
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// Supported PKCE code challenge methods
    pub code_challenge_methods_supported: Vec<String>,

    /// Supported scopes
    pub scopes_supported: Vec<String>,
}

/// OAuth Protected Resource Metadata (RFC 9728)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Protected resource identifier
    pub resource: String,

    /// Authorization servers that can issue tokens for this resource
    pub authorization_servers: Vec<String>,

    /// Supported scopes
    pub scopes_supported: Vec<String>,

    /// Supported bearer token methods
    pub bearer_methods_supported: Vec<String>,

    /// Human-readable resource name
    pub resource_name: String,
}

impl AuthorizationServerMetadata {
    /// Metadata for the gateway served at `base_url`
    #[must_use]
    pub fn for_gateway(base_url: &str, scopes: &[String]) -> Self {
        Self {
            issuer: base_url.to_string(),
            authorization_endpoint: format!("{base_url}/oauth/authorize"),
            token_endpoint: format!("{base_url}/oauth/token"),
            registration_endpoint: format!("{base_url}/oauth/register"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
            code_challenge_methods_supported: vec!["S256".to_string()],
            scopes_supported: scopes.to_vec(),
        }
    }
}

impl ProtectedResourceMetadata {
    /// Metadata for the `/mcp` endpoint of the gateway served at `base_url`
    #[must_use]
    pub fn for_gateway(base_url: &str, scopes: &[String]) -> Self {
        Self {
            resource: format!("{base_url}/mcp"),
            authorization_servers: vec![base_url.to_string()],
            scopes_supported: scopes.to_vec(),
            bearer_methods_supported: vec!["header".to_string()],
            resource_name: RESOURCE_NAME.to_string(),
        }
    }

    /// URL at which this document is published, used in `WWW-Authenticate`
    #[must_use]
    pub fn url_for(base_url: &str) -> String {
        format!("{base_url}/.well-known/oauth-protected-resource/mcp")
    }
}

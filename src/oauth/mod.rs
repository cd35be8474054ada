//! OAuth 2.0 delegation for the Strava MCP Gateway
//!
//! The gateway plays two roles at once: an authorization server towards the
//! MCP agent, and an OAuth client towards Strava. No session store bridges
//! the two flows. Instead:
//!
//! 1. `/oauth/authorize` signs the agent's redirect URI and state into an
//!    [`AuthorizeState`] token and sends the browser to Strava with it.
//! 2. `/oauth/callback` verifies that token, wraps Strava's authorization
//!    code into a [`WrappedCode`] token and hands it to the agent.
//! 3. `/oauth/token` verifies the wrapped code and redeems the inner Strava
//!    code through [`StravaOAuth`].
//!
//! Features:
//! - HMAC-SHA256 signed state tokens (see [`StateCodec`])
//! - Authorization code and refresh token exchange against Strava
//! - RFC 8414 / RFC 9728 discovery documents
//! - Optional S256 PKCE carried inside the signed tokens

mod error;
pub mod flow;
mod metadata;
pub mod state;
mod upstream;

use std::fmt;

pub use error::OAuthError;
pub use flow::{
    AuthorizeRequest, CallbackOutcome, CallbackRequest, DelegationFlow, RegistrationRequest,
    RegistrationResponse, TokenRequest,
};
pub use metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
pub use state::{AuthorizeState, StateCodec, WrappedCode, decode_state, encode_state};
pub use upstream::{StravaOAuth, TokenResponse};

/// Immutable OAuth settings resolved once at startup
#[derive(Clone)]
pub struct OAuthSettings {
    /// Strava application client ID
    pub client_id: String,
    /// Strava application client secret
    pub client_secret: String,
    /// Secret used to sign state tokens
    pub state_secret: String,
    /// Scopes requested from Strava
    pub scopes: Vec<String>,
    /// Strava authorize endpoint
    pub authorize_url: String,
    /// Strava token endpoint
    pub token_url: String,
}

impl OAuthSettings {
    /// Scope string as Strava expects it (comma separated)
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(",")
    }
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("state_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secrets() {
        let settings = OAuthSettings {
            client_id: "12345".to_string(),
            client_secret: "very-secret".to_string(),
            state_secret: "signing-key".to_string(),
            scopes: vec!["read".to_string()],
            authorize_url: "https://www.strava.com/oauth/authorize".to_string(),
            token_url: "https://www.strava.com/oauth/token".to_string(),
        };

        let debug = format!("{settings:?}");
        assert!(debug.contains("12345"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("signing-key"));
    }
}

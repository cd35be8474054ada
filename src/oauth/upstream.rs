//! Token exchanges against Strava's OAuth endpoint

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{OAuthError, OAuthSettings};

/// Token response returned to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Strava access token
    pub access_token: String,
    /// Token type (always `Bearer` for Strava)
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Configured scope string (never Strava's granted scope)
    pub scope: String,
    /// Absolute expiry, epoch seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Strava's token body. The `athlete` summary is ignored.
#[derive(Debug, Deserialize)]
struct UpstreamToken {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
    expires_at: Option<i64>,
    refresh_token: Option<String>,
}

/// OAuth client side of the bridge
#[derive(Clone)]
pub struct StravaOAuth {
    http: Client,
    settings: Arc<OAuthSettings>,
}

impl StravaOAuth {
    /// Create a bridge sharing the given HTTP client
    #[must_use]
    pub fn new(http: Client, settings: Arc<OAuthSettings>) -> Self {
        Self { http, settings }
    }

    /// Redeem an authorization code issued by Strava
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidGrant`] when Strava rejects the exchange or
    /// cannot be reached, and [`OAuthError::Upstream`] when Strava reports an
    /// error inside a successful response.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> Result<TokenResponse, OAuthError> {
        self.exchange("authorization_code", &[("code", code)]).await
    }

    /// Refresh an access token
    ///
    /// # Errors
    ///
    /// Same as [`Self::exchange_authorization_code`].
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        self.exchange("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }

    async fn exchange(
        &self,
        grant_type: &str,
        extra: &[(&str, &str)],
    ) -> Result<TokenResponse, OAuthError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("grant_type", grant_type),
        ];
        params.extend_from_slice(extra);

        debug!(grant_type, url = %self.settings.token_url, "Exchanging token with Strava");

        let response = self
            .http
            .post(&self.settings.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                warn!(grant_type, error = %e, "Strava token endpoint unreachable");
                rejected()
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!(grant_type, error = %e, "Failed to read Strava token response");
            rejected()
        })?;

        if !status.is_success() {
            warn!(grant_type, status = %status, body = %body, "Strava token exchange failed");
            return Err(rejected());
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            warn!(grant_type, error = %e, "Strava token response is not JSON");
            rejected()
        })?;

        if let Some(error) = value.get("error") {
            let error = error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            let description = value
                .get("error_description")
                .and_then(Value::as_str)
                .map(str::to_string);
            warn!(
                grant_type,
                error = %error,
                description = description.as_deref().unwrap_or(""),
                "Strava returned an error in a successful response"
            );
            return Err(OAuthError::Upstream { error, description });
        }

        let token: UpstreamToken = serde_json::from_value(value).map_err(|e| {
            warn!(grant_type, error = %e, "Unexpected Strava token response shape");
            rejected()
        })?;

        Ok(TokenResponse {
            access_token: token.access_token,
            token_type: token.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
            scope: self.settings.scope_string(),
            expires_at: token.expires_at,
        })
    }
}

fn rejected() -> OAuthError {
    OAuthError::InvalidGrant("Token exchange with Strava failed".to_string())
}

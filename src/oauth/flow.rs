//! Delegation flow transitions
//!
//! Each endpoint of the authorization server is one function here. None of
//! them touch storage: whatever must survive a redirect hop is signed into a
//! state token by [`StateCodec`].

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AuthorizeState, OAuthError, OAuthSettings, StateCodec, StravaOAuth, TokenResponse,
    WrappedCode,
};

/// Current time in epoch milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Dynamic client registration request (RFC 7591). Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    /// Redirect URIs the client intends to use
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Display name
    #[serde(default)]
    pub client_name: Option<String>,
}

impl RegistrationRequest {
    /// Parse a registration body, treating anything unparsable as empty
    #[must_use]
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// Dynamic client registration response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Freshly generated client identifier
    pub client_id: String,
    /// Issue time, epoch seconds
    pub client_id_issued_at: i64,
    /// Always 0: no client secret is issued
    pub client_secret_expires_at: i64,
    /// Redirect URIs echoed back unvalidated
    pub redirect_uris: Vec<String>,
    /// Supported grant types
    pub grant_types: Vec<String>,
    /// Supported response types
    pub response_types: Vec<String>,
    /// Always `none`
    pub token_endpoint_auth_method: String,
    /// Display name, when one was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

/// Query of `GET /oauth/authorize`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    /// Where to send the agent's browser afterwards
    pub redirect_uri: Option<String>,
    /// Agent's opaque state
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE method (only `S256` is accepted)
    pub code_challenge_method: Option<String>,
}

/// Query of `GET /oauth/callback`, as sent by Strava
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackRequest {
    /// Strava authorization code
    pub code: Option<String>,
    /// Signed [`AuthorizeState`]
    pub state: Option<String>,
    /// Error reported by Strava (e.g. `access_denied`)
    pub error: Option<String>,
    /// Error description reported by Strava
    pub error_description: Option<String>,
}

/// Result of a successful callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Send the browser to this URL
    Redirect(String),
    /// No redirect target: hand the wrapped code back directly
    Code(String),
}

/// Normalized body of `POST /oauth/token`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    params: HashMap<String, String>,
}

impl TokenRequest {
    /// Build from already-normalized parameters. Empty values count as absent.
    #[must_use]
    pub fn from_params(params: HashMap<String, String>) -> Self {
        let params = params
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Self { params }
    }

    /// Normalize a form-encoded or JSON body.
    ///
    /// JSON is assumed when the content type says so, or when it is absent and
    /// the body looks like an object. Non-string JSON scalars are stringified.
    #[must_use]
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Self {
        let is_json = match content_type {
            Some(ct) => ct.to_ascii_lowercase().contains("json"),
            None => body.trim_ascii_start().first() == Some(&b'{'),
        };

        let params = if is_json {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => map
                    .into_iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) => Some((k, s)),
                        Value::Number(n) => Some((k, n.to_string())),
                        Value::Bool(b) => Some((k, b.to_string())),
                        _ => None,
                    })
                    .collect(),
                _ => HashMap::new(),
            }
        } else {
            url::form_urlencoded::parse(body).into_owned().collect()
        };

        Self::from_params(params)
    }

    /// Look up a parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

struct Configured {
    settings: Arc<OAuthSettings>,
    codec: StateCodec,
    upstream: StravaOAuth,
}

/// The four authorization server transitions
#[derive(Clone)]
pub struct DelegationFlow {
    inner: Option<Arc<Configured>>,
}

impl DelegationFlow {
    /// Create the flow. `None` settings leave every transition except
    /// registration answering [`OAuthError::NotConfigured`].
    #[must_use]
    pub fn new(settings: Option<Arc<OAuthSettings>>, http: Client) -> Self {
        let inner = settings.map(|settings| {
            Arc::new(Configured {
                codec: StateCodec::new(settings.state_secret.as_bytes()),
                upstream: StravaOAuth::new(http, Arc::clone(&settings)),
                settings,
            })
        });
        Self { inner }
    }

    /// Whether the Strava credentials and state secret are all present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    fn configured(&self) -> Result<&Configured, OAuthError> {
        self.inner.as_deref().ok_or_else(|| {
            warn!("OAuth request rejected: client credentials or state secret not configured");
            OAuthError::NotConfigured
        })
    }

    /// `POST /oauth/register`: issue a throwaway client ID
    #[must_use]
    pub fn register(&self, request: RegistrationRequest, now_ms: i64) -> RegistrationResponse {
        let client_id = uuid::Uuid::new_v4().to_string();
        info!(
            client_name = request.client_name.as_deref().unwrap_or(""),
            redirect_uris = request.redirect_uris.len(),
            "Registered OAuth client"
        );

        RegistrationResponse {
            client_id,
            client_id_issued_at: now_ms / 1000,
            client_secret_expires_at: 0,
            redirect_uris: request.redirect_uris,
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            client_name: request.client_name,
        }
    }

    /// `GET /oauth/authorize`: build the Strava authorize URL carrying a
    /// signed [`AuthorizeState`]
    ///
    /// # Errors
    ///
    /// [`OAuthError::NotConfigured`] without credentials,
    /// [`OAuthError::InvalidRequest`] for a non-S256 PKCE method.
    pub fn authorize(
        &self,
        request: AuthorizeRequest,
        callback_url: &str,
        now_ms: i64,
    ) -> Result<String, OAuthError> {
        let configured = self.configured()?;

        let code_challenge = non_empty(request.code_challenge);
        if code_challenge.is_some() {
            match request.code_challenge_method.as_deref() {
                Some("S256") => {}
                other => {
                    return Err(OAuthError::InvalidRequest(format!(
                        "Unsupported code_challenge_method: {}",
                        other.unwrap_or("plain")
                    )));
                }
            }
        }

        let state = AuthorizeState {
            redirect_uri: non_empty(request.redirect_uri),
            client_state: non_empty(request.state),
            timestamp: now_ms,
            code_challenge,
        };
        let signed = configured.codec.encode(&state).map_err(|e| {
            warn!(error = %e, "Failed to sign authorize state");
            OAuthError::NotConfigured
        })?;

        let settings = &configured.settings;
        let mut url = Url::parse(&settings.authorize_url).map_err(|e| {
            warn!(url = %settings.authorize_url, error = %e, "Invalid Strava authorize URL");
            OAuthError::NotConfigured
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &settings.client_id)
            .append_pair("redirect_uri", callback_url)
            .append_pair("response_type", "code")
            .append_pair("approval_prompt", "auto")
            .append_pair("scope", &settings.scope_string())
            .append_pair("state", &signed);

        info!(
            has_redirect = state.redirect_uri.is_some(),
            pkce = state.code_challenge.is_some(),
            "Redirecting to Strava authorization"
        );
        Ok(url.into())
    }

    /// `GET /oauth/callback`: verify the state and wrap Strava's code
    ///
    /// # Errors
    ///
    /// [`OAuthError::InvalidRequest`] for a missing, invalid or expired state
    /// or a missing code. A Strava-reported error without a redirect target
    /// is returned as [`OAuthError::Upstream`].
    pub fn callback(
        &self,
        request: CallbackRequest,
        now_ms: i64,
    ) -> Result<CallbackOutcome, OAuthError> {
        let configured = self.configured()?;

        let token = non_empty(request.state).ok_or_else(|| OAuthError::missing("state"))?;
        let state: AuthorizeState = configured.codec.decode(&token).ok_or_else(|| {
            debug!("Callback state failed verification");
            OAuthError::invalid_state()
        })?;

        if state.is_expired(now_ms) {
            info!(age_ms = now_ms - state.timestamp, "Callback state expired");
            return Err(OAuthError::InvalidRequest("State expired".to_string()));
        }

        if let Some(error) = non_empty(request.error) {
            warn!(error = %error, "Strava reported an authorization error");
            let description = non_empty(request.error_description);
            return match state.redirect_uri.as_deref() {
                Some(redirect_uri) => {
                    let mut params = vec![("error", error.as_str())];
                    if let Some(d) = description.as_deref() {
                        params.push(("error_description", d));
                    }
                    if let Some(s) = state.client_state.as_deref() {
                        params.push(("state", s));
                    }
                    append_query(redirect_uri, &params).map(CallbackOutcome::Redirect)
                }
                None => Err(OAuthError::Upstream { error, description }),
            };
        }

        let strava_code = non_empty(request.code).ok_or_else(|| OAuthError::missing("code"))?;
        let wrapped = configured
            .codec
            .encode(&WrappedCode {
                strava_code,
                code_challenge: state.code_challenge,
            })
            .map_err(|e| {
                warn!(error = %e, "Failed to sign wrapped code");
                OAuthError::NotConfigured
            })?;

        match state.redirect_uri.as_deref() {
            Some(redirect_uri) => {
                let mut params = vec![("code", wrapped.as_str())];
                if let Some(s) = state.client_state.as_deref() {
                    params.push(("state", s));
                }
                info!("Returning wrapped code to client redirect");
                append_query(redirect_uri, &params).map(CallbackOutcome::Redirect)
            }
            None => {
                info!("Returning wrapped code directly");
                Ok(CallbackOutcome::Code(wrapped))
            }
        }
    }

    /// `POST /oauth/token`: dispatch on `grant_type`
    ///
    /// # Errors
    ///
    /// See [`OAuthError`]; upstream failures come from [`StravaOAuth`].
    pub async fn token(&self, request: &TokenRequest) -> Result<TokenResponse, OAuthError> {
        let configured = self.configured()?;

        let grant_type = request
            .get("grant_type")
            .ok_or_else(|| OAuthError::missing("grant_type"))?;

        match grant_type {
            "refresh_token" => {
                let refresh_token = request
                    .get("refresh_token")
                    .ok_or_else(|| OAuthError::missing("refresh_token"))?;
                info!(grant_type, "Token request");
                configured.upstream.exchange_refresh_token(refresh_token).await
            }
            "authorization_code" => {
                let code = request
                    .get("code")
                    .ok_or_else(|| OAuthError::missing("code"))?;
                let wrapped: WrappedCode = configured.codec.decode(code).ok_or_else(|| {
                    debug!("Authorization code failed verification");
                    OAuthError::InvalidGrant("Invalid authorization code".to_string())
                })?;

                if let Some(challenge) = wrapped.code_challenge.as_deref() {
                    verify_pkce(challenge, request.get("code_verifier"))?;
                }

                info!(grant_type, "Token request");
                configured
                    .upstream
                    .exchange_authorization_code(&wrapped.strava_code)
                    .await
            }
            other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

/// Check an S256 PKCE verifier against the challenge carried in the code
fn verify_pkce(challenge: &str, verifier: Option<&str>) -> Result<(), OAuthError> {
    let verifier =
        verifier.ok_or_else(|| OAuthError::InvalidGrant("Missing code_verifier".to_string()))?;

    let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    if bool::from(computed.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        Err(OAuthError::InvalidGrant(
            "PKCE verification failed".to_string(),
        ))
    }
}

/// Append query parameters, keeping any the URI already has
fn append_query(uri: &str, params: &[(&str, &str)]) -> Result<String, OAuthError> {
    let mut url = Url::parse(uri)
        .map_err(|_| OAuthError::InvalidRequest("Invalid redirect_uri".to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url.into())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000_000;
    const CALLBACK: &str = "https://gateway.example/oauth/callback";

    fn settings() -> Arc<OAuthSettings> {
        Arc::new(OAuthSettings {
            client_id: "12345".to_string(),
            client_secret: "shh".to_string(),
            state_secret: "state-secret".to_string(),
            scopes: vec!["read".to_string(), "activity:read_all".to_string()],
            authorize_url: "https://www.strava.com/oauth/authorize".to_string(),
            token_url: "http://127.0.0.1:1/oauth/token".to_string(),
        })
    }

    fn flow() -> DelegationFlow {
        DelegationFlow::new(Some(settings()), Client::new())
    }

    fn unconfigured() -> DelegationFlow {
        DelegationFlow::new(None, Client::new())
    }

    fn codec() -> StateCodec {
        StateCodec::new("state-secret")
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn signed_state(redirect_uri: Option<&str>, client_state: Option<&str>, timestamp: i64) -> String {
        codec()
            .encode(&AuthorizeState {
                redirect_uri: redirect_uri.map(str::to_string),
                client_state: client_state.map(str::to_string),
                timestamp,
                code_challenge: None,
            })
            .unwrap()
    }

    fn callback_with(state: &str, code: Option<&str>) -> CallbackRequest {
        CallbackRequest {
            code: code.map(str::to_string),
            state: Some(state.to_string()),
            ..CallbackRequest::default()
        }
    }

    fn token_request(pairs: &[(&str, &str)]) -> TokenRequest {
        TokenRequest::from_params(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    // ── register ──────────────────────────────────────────────────────────

    #[test]
    fn register_echoes_redirect_uris_with_fresh_ids() {
        let flow = unconfigured();
        let request = RegistrationRequest::from_body(
            br#"{"redirect_uris":["https://client.example/cb"],"client_name":"Agent"}"#,
        );

        let first = flow.register(request.clone(), NOW);
        let second = flow.register(request, NOW);

        assert_ne!(first.client_id, second.client_id);
        assert_eq!(first.redirect_uris, vec!["https://client.example/cb"]);
        assert_eq!(first.client_id_issued_at, NOW / 1000);
        assert_eq!(first.client_secret_expires_at, 0);
        assert_eq!(first.grant_types, vec!["authorization_code", "refresh_token"]);
        assert_eq!(first.response_types, vec!["code"]);
        assert_eq!(first.token_endpoint_auth_method, "none");
        assert_eq!(first.client_name.as_deref(), Some("Agent"));
    }

    #[test]
    fn register_tolerates_garbage_body() {
        let response = unconfigured().register(RegistrationRequest::from_body(b"not json"), NOW);
        assert!(response.redirect_uris.is_empty());
        assert_eq!(response.client_name, None);
    }

    // ── authorize ─────────────────────────────────────────────────────────

    #[test]
    fn authorize_requires_configuration() {
        let err = unconfigured()
            .authorize(AuthorizeRequest::default(), CALLBACK, NOW)
            .unwrap_err();
        assert_eq!(err, OAuthError::NotConfigured);
    }

    #[test]
    fn authorize_redirects_to_strava_with_signed_state() {
        let location = flow()
            .authorize(
                AuthorizeRequest {
                    redirect_uri: Some("https://client.example/cb".to_string()),
                    state: Some("xyz".to_string()),
                    ..AuthorizeRequest::default()
                },
                CALLBACK,
                NOW,
            )
            .unwrap();

        assert!(location.starts_with("https://www.strava.com/oauth/authorize?"));
        assert_eq!(query_param(&location, "client_id").as_deref(), Some("12345"));
        assert_eq!(query_param(&location, "redirect_uri").as_deref(), Some(CALLBACK));
        assert_eq!(query_param(&location, "response_type").as_deref(), Some("code"));
        assert_eq!(query_param(&location, "approval_prompt").as_deref(), Some("auto"));
        assert_eq!(
            query_param(&location, "scope").as_deref(),
            Some("read,activity:read_all")
        );

        let state: AuthorizeState = codec()
            .decode(&query_param(&location, "state").unwrap())
            .unwrap();
        assert_eq!(
            state,
            AuthorizeState {
                redirect_uri: Some("https://client.example/cb".to_string()),
                client_state: Some("xyz".to_string()),
                timestamp: NOW,
                code_challenge: None,
            }
        );
    }

    #[test]
    fn authorize_rejects_plain_pkce() {
        for method in [None, Some("plain".to_string())] {
            let err = flow()
                .authorize(
                    AuthorizeRequest {
                        code_challenge: Some("challenge".to_string()),
                        code_challenge_method: method,
                        ..AuthorizeRequest::default()
                    },
                    CALLBACK,
                    NOW,
                )
                .unwrap_err();
            assert_eq!(err.code(), "invalid_request");
        }
    }

    // ── callback ──────────────────────────────────────────────────────────

    #[test]
    fn callback_requires_state() {
        let err = flow()
            .callback(
                CallbackRequest {
                    code: Some("ABC123".to_string()),
                    ..CallbackRequest::default()
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn callback_rejects_forged_state() {
        let forged = StateCodec::new("other-secret")
            .encode(&AuthorizeState {
                redirect_uri: Some("https://evil.example/".to_string()),
                client_state: None,
                timestamp: NOW,
                code_challenge: None,
            })
            .unwrap();
        let err = flow()
            .callback(callback_with(&forged, Some("ABC123")), NOW)
            .unwrap_err();
        assert_eq!(err, OAuthError::invalid_state());
    }

    #[test]
    fn callback_rejects_wrapped_code_as_state() {
        let wrapped = codec()
            .encode(&WrappedCode {
                strava_code: "ABC123".to_string(),
                code_challenge: None,
            })
            .unwrap();
        let err = flow()
            .callback(callback_with(&wrapped, Some("ABC123")), NOW)
            .unwrap_err();
        assert_eq!(err, OAuthError::invalid_state());
    }

    #[test]
    fn callback_expiry_boundary() {
        let expired = signed_state(None, None, NOW - 10 * 60 * 1000 - 1);
        let err = flow()
            .callback(callback_with(&expired, Some("ABC123")), NOW)
            .unwrap_err();
        assert_eq!(err, OAuthError::InvalidRequest("State expired".to_string()));

        let fresh = signed_state(None, None, NOW - 9 * 60 * 1000);
        let outcome = flow()
            .callback(callback_with(&fresh, Some("ABC123")), NOW)
            .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Code(_)));
    }

    #[test]
    fn expiry_is_checked_before_upstream_error() {
        let expired = signed_state(Some("https://client.example/cb"), None, NOW - 11 * 60 * 1000);
        let err = flow()
            .callback(
                CallbackRequest {
                    state: Some(expired),
                    error: Some("access_denied".to_string()),
                    ..CallbackRequest::default()
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, OAuthError::InvalidRequest("State expired".to_string()));
    }

    #[test]
    fn upstream_error_returns_control_to_client() {
        let state = signed_state(Some("https://client.example/cb"), Some("xyz"), NOW);
        let outcome = flow()
            .callback(
                CallbackRequest {
                    state: Some(state),
                    error: Some("access_denied".to_string()),
                    error_description: Some("denied".to_string()),
                    ..CallbackRequest::default()
                },
                NOW,
            )
            .unwrap();

        let CallbackOutcome::Redirect(location) = outcome else {
            panic!("expected redirect");
        };
        assert!(location.starts_with("https://client.example/cb?"));
        assert_eq!(query_param(&location, "error").as_deref(), Some("access_denied"));
        assert_eq!(query_param(&location, "error_description").as_deref(), Some("denied"));
        assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
        assert_eq!(query_param(&location, "code"), None);
    }

    #[test]
    fn upstream_error_without_redirect_is_surfaced() {
        let state = signed_state(None, None, NOW);
        let err = flow()
            .callback(
                CallbackRequest {
                    state: Some(state),
                    error: Some("access_denied".to_string()),
                    ..CallbackRequest::default()
                },
                NOW,
            )
            .unwrap_err();
        assert_eq!(err.code(), "access_denied");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn callback_requires_code() {
        let state = signed_state(None, None, NOW);
        let err = flow().callback(callback_with(&state, None), NOW).unwrap_err();
        assert_eq!(err, OAuthError::missing("code"));
    }

    #[test]
    fn callback_redirect_preserves_existing_query() {
        let state = signed_state(Some("https://client.example/cb?tenant=a"), Some("xyz"), NOW);
        let outcome = flow()
            .callback(callback_with(&state, Some("ABC123")), NOW)
            .unwrap();

        let CallbackOutcome::Redirect(location) = outcome else {
            panic!("expected redirect");
        };
        assert_eq!(query_param(&location, "tenant").as_deref(), Some("a"));
        assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));

        let wrapped: WrappedCode = codec()
            .decode(&query_param(&location, "code").unwrap())
            .unwrap();
        assert_eq!(wrapped.strava_code, "ABC123");
    }

    #[test]
    fn callback_without_client_state_omits_state() {
        let state = signed_state(Some("https://client.example/cb"), None, NOW);
        let CallbackOutcome::Redirect(location) = flow()
            .callback(callback_with(&state, Some("ABC123")), NOW)
            .unwrap()
        else {
            panic!("expected redirect");
        };
        assert_eq!(query_param(&location, "state"), None);
    }

    #[test]
    fn callback_without_redirect_returns_code() {
        let state = signed_state(None, None, NOW);
        let CallbackOutcome::Code(code) = flow()
            .callback(callback_with(&state, Some("ABC123")), NOW)
            .unwrap()
        else {
            panic!("expected code");
        };
        let wrapped: WrappedCode = codec().decode(&code).unwrap();
        assert_eq!(wrapped.strava_code, "ABC123");
    }

    #[test]
    fn challenge_travels_from_state_into_wrapped_code() {
        let location = flow()
            .authorize(
                AuthorizeRequest {
                    code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()),
                    code_challenge_method: Some("S256".to_string()),
                    ..AuthorizeRequest::default()
                },
                CALLBACK,
                NOW,
            )
            .unwrap();
        let state = query_param(&location, "state").unwrap();

        let CallbackOutcome::Code(code) = flow()
            .callback(callback_with(&state, Some("ABC123")), NOW)
            .unwrap()
        else {
            panic!("expected code");
        };
        let wrapped: WrappedCode = codec().decode(&code).unwrap();
        assert_eq!(
            wrapped.code_challenge.as_deref(),
            Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM")
        );
    }

    // ── token ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn token_requires_configuration() {
        let err = unconfigured()
            .token(&token_request(&[("grant_type", "refresh_token"), ("refresh_token", "r1")]))
            .await
            .unwrap_err();
        assert_eq!(err, OAuthError::NotConfigured);
    }

    #[tokio::test]
    async fn token_grant_dispatch_errors() {
        let flow = flow();
        let cases: &[(&[(&str, &str)], &str)] = &[
            (&[], "invalid_request"),
            (&[("grant_type", "password")], "unsupported_grant_type"),
            (&[("grant_type", "refresh_token")], "invalid_request"),
            (&[("grant_type", "authorization_code")], "invalid_request"),
            (
                &[("grant_type", "authorization_code"), ("code", "forged.code")],
                "invalid_grant",
            ),
        ];

        for (pairs, expected) in cases {
            let err = flow.token(&token_request(pairs)).await.unwrap_err();
            assert_eq!(err.code(), *expected, "params {pairs:?}");
        }
    }

    #[tokio::test]
    async fn authorize_state_is_not_accepted_as_code() {
        let state = signed_state(None, None, NOW);
        let err = flow()
            .token(&token_request(&[
                ("grant_type", "authorization_code"),
                ("code", state.as_str()),
            ]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
    }

    #[tokio::test]
    async fn pkce_verifier_must_match_challenge() {
        let code = codec()
            .encode(&WrappedCode {
                strava_code: "ABC123".to_string(),
                code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()),
            })
            .unwrap();

        let missing = flow()
            .token(&token_request(&[("grant_type", "authorization_code"), ("code", code.as_str())]))
            .await
            .unwrap_err();
        assert_eq!(missing, OAuthError::InvalidGrant("Missing code_verifier".to_string()));

        let wrong = flow()
            .token(&token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("code_verifier", "not-the-verifier"),
            ]))
            .await
            .unwrap_err();
        assert_eq!(wrong, OAuthError::InvalidGrant("PKCE verification failed".to_string()));
    }

    #[test]
    fn pkce_accepts_rfc7636_vector() {
        assert_eq!(
            verify_pkce(
                "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
                Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            ),
            Ok(())
        );
    }

    // ── body normalization ────────────────────────────────────────────────

    #[test]
    fn token_body_form_and_json_normalize_alike() {
        let form = TokenRequest::from_body(
            Some("application/x-www-form-urlencoded"),
            b"grant_type=authorization_code&code=a%2Bb&code_verifier=",
        );
        let json = TokenRequest::from_body(
            Some("application/json; charset=utf-8"),
            br#"{"grant_type":"authorization_code","code":"a+b","code_verifier":""}"#,
        );
        assert_eq!(form, json);
        assert_eq!(form.get("code"), Some("a+b"));
        assert_eq!(form.get("code_verifier"), None);
    }

    #[test]
    fn token_body_json_scalars_are_stringified() {
        let request = TokenRequest::from_body(None, br#" {"grant_type":"refresh_token","n":7,"b":true,"o":{}}"#);
        assert_eq!(request.get("grant_type"), Some("refresh_token"));
        assert_eq!(request.get("n"), Some("7"));
        assert_eq!(request.get("b"), Some("true"));
        assert_eq!(request.get("o"), None);
    }
}

//! Bearer-authenticated Strava REST client

use std::fmt;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::Result;

/// Field-level detail in a Strava fault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StravaFieldError {
    /// Resource type (e.g. `Activity`)
    pub resource: String,
    /// Offending field
    pub field: String,
    /// Error code (e.g. `invalid`, `not found`)
    pub code: String,
}

impl fmt::Display for StravaFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.resource, self.field, self.code)
    }
}

/// Non-2xx response from the Strava API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Strava API error {status}: {message}")]
pub struct StravaApiError {
    /// HTTP status
    pub status: u16,
    /// Fault message, or the HTTP reason phrase
    pub message: String,
    /// Field-level errors
    pub errors: Vec<StravaFieldError>,
}

/// Strava's fault body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fault {
    message: Option<String>,
    errors: Vec<StravaFieldError>,
}

impl StravaApiError {
    fn from_response(status: StatusCode, body: &str) -> Self {
        let fault: Fault = serde_json::from_str(body).unwrap_or_default();
        let message = fault
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

        Self {
            status: status.as_u16(),
            message,
            errors: fault.errors,
        }
    }
}

/// Client for one agent's access token
#[derive(Clone)]
pub struct StravaClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl fmt::Debug for StravaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StravaClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl StravaClient {
    /// Create a client sharing `http`'s connection pool
    pub fn new(http: Client, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Perform one API call. `path` is relative to the API base (`/athlete`).
    ///
    /// HTTP 204 yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Http`] on transport failure, [`crate::Error::StravaApi`]
    /// on a non-2xx response, [`crate::Error::Json`] on an unreadable body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        form: &[(String, String)],
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(method = %method, url = %url, "Strava API request");

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body = response.text().await?;
        if !status.is_success() {
            let err = StravaApiError::from_response(status, &body);
            debug!(status = err.status, message = %err.message, "Strava API fault");
            return Err(err.into());
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// `GET` convenience wrapper
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        self.request(Method::GET, path, query, &[]).await
    }
}

//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::oauth::OAuthSettings;
use crate::{Error, Result};

/// Strava's OAuth authorization endpoint
pub const STRAVA_AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";
/// Strava's OAuth token endpoint
pub const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
/// Strava REST API base
pub const STRAVA_API_BASE_URL: &str = "https://www.strava.com/api/v3";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving `env:` references.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// OAuth delegation configuration
    pub oauth: OAuthConfig,
    /// Strava API configuration
    pub strava: StravaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: vec![".env".to_string()],
            server: ServerConfig::default(),
            oauth: OAuthConfig::default(),
            strava: StravaConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL (e.g. `https://strava-mcp.example.com`).
    /// When unset, the base URL is derived from each request's host headers.
    pub public_url: Option<String>,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Base URL used when neither `public_url` nor request headers are available
    #[must_use]
    pub fn fallback_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// OAuth delegation configuration
///
/// Secret values support a literal value or `env:VAR_NAME`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Strava application client ID
    pub client_id: Option<String>,
    /// Strava application client secret
    pub client_secret: Option<String>,
    /// Secret used to sign state tokens
    pub state_secret: Option<String>,
    /// Scopes requested from Strava (and reported to agents)
    pub scopes: Vec<String>,
    /// Strava authorize endpoint
    pub authorize_url: String,
    /// Strava token endpoint
    pub token_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: Some("env:STRAVA_CLIENT_ID".to_string()),
            client_secret: Some("env:STRAVA_CLIENT_SECRET".to_string()),
            state_secret: Some("env:STATE_SECRET".to_string()),
            scopes: default_scopes(),
            authorize_url: STRAVA_AUTHORIZE_URL.to_string(),
            token_url: STRAVA_TOKEN_URL.to_string(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    ["read", "activity:read_all", "profile:read_all"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl OAuthConfig {
    /// Resolve secrets into runtime settings.
    ///
    /// Returns `None` when any of the three secrets is missing or empty; the
    /// OAuth endpoints then answer with a configuration error.
    #[must_use]
    pub fn resolve(&self) -> Option<OAuthSettings> {
        let client_id = resolve_secret(self.client_id.as_deref()?)?;
        let client_secret = resolve_secret(self.client_secret.as_deref()?)?;
        let state_secret = resolve_secret(self.state_secret.as_deref()?)?;

        Some(OAuthSettings {
            client_id,
            client_secret,
            state_secret,
            scopes: self.scopes.clone(),
            authorize_url: self.authorize_url.clone(),
            token_url: self.token_url.clone(),
        })
    }
}

/// Resolve a secret reference: `env:VAR_NAME` reads the environment, anything
/// else is taken literally. Empty results count as absent.
#[must_use]
pub fn resolve_secret(value: &str) -> Option<String> {
    let resolved = if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).ok()?
    } else {
        value.to_string()
    };

    let trimmed = resolved.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strava API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StravaConfig {
    /// Base URL of the Strava REST API
    pub api_base_url: String,
}

impl Default for StravaConfig {
    fn default() -> Self {
        Self {
            api_base_url: STRAVA_API_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (STRAVA_MCP_ prefix)
        figment = figment.merge(Env::prefixed("STRAVA_MCP_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before `env:` resolution)
        config.load_env_files();
        config.normalize();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Trim trailing slashes from configured URLs so paths can be appended
    fn normalize(&mut self) {
        if let Some(url) = self.server.public_url.take() {
            let trimmed = url.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                self.server.public_url = Some(trimmed.to_string());
            }
        }
        let base = self.strava.api_base_url.trim_end_matches('/').to_string();
        self.strava.api_base_url = base;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_point_at_strava() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.oauth.authorize_url, STRAVA_AUTHORIZE_URL);
        assert_eq!(config.oauth.token_url, STRAVA_TOKEN_URL);
        assert_eq!(config.strava.api_base_url, STRAVA_API_BASE_URL);
        assert_eq!(
            config.oauth.scopes,
            vec!["read", "activity:read_all", "profile:read_all"]
        );
    }

    #[test]
    fn literal_secret_is_used_verbatim() {
        assert_eq!(resolve_secret("abc123"), Some("abc123".to_string()));
    }

    #[test]
    fn empty_secret_counts_as_missing() {
        assert_eq!(resolve_secret("   "), None);
    }

    #[test]
    fn env_secret_reads_environment() {
        let expected = env::var("PATH").ok().filter(|v| !v.trim().is_empty());
        assert_eq!(resolve_secret("env:PATH"), expected.map(|v| v.trim().to_string()));
    }

    #[test]
    fn unset_env_secret_is_missing() {
        assert_eq!(resolve_secret("env:STRAVA_MCP_TEST_DEFINITELY_UNSET_VAR"), None);
    }

    #[test]
    fn resolve_requires_all_three_secrets() {
        let mut oauth = OAuthConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            state_secret: Some("signing".to_string()),
            ..OAuthConfig::default()
        };
        let settings = oauth.resolve().expect("fully configured");
        assert_eq!(settings.client_id, "id");
        assert_eq!(settings.scope_string(), "read,activity:read_all,profile:read_all");

        oauth.state_secret = None;
        assert!(oauth.resolve().is_none());
    }

    #[test]
    fn load_reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "env_files: []\nserver:\n  port: 8080\n  public_url: \"https://mcp.example.com/\"\noauth:\n  client_id: \"12345\"\n  scopes: [\"read\"]\nstrava:\n  api_base_url: \"http://localhost:9999/api/v3/\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.server.public_url.as_deref(),
            Some("https://mcp.example.com")
        );
        assert_eq!(config.oauth.client_id.as_deref(), Some("12345"));
        assert_eq!(config.oauth.scopes, vec!["read"]);
        assert_eq!(config.strava.api_base_url, "http://localhost:9999/api/v3");
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/strava-mcp.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

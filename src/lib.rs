//! Strava MCP Gateway Library
//!
//! Exposes the Strava v3 API to MCP (Model Context Protocol) agents over
//! Streamable HTTP, and brokers the OAuth 2.0 authorization that agents need
//! to reach it.
//!
//! # Features
//!
//! - **Stateless OAuth delegation**: the gateway acts as an authorization
//!   server towards the agent and as an OAuth client towards Strava. All
//!   continuity between the two redirect hops travels inside HMAC-signed
//!   state tokens; nothing is persisted server-side.
//! - **Discovery**: RFC 8414 authorization server metadata and RFC 9728
//!   protected resource metadata.
//! - **Strava tools**: athletes, activities, segments, clubs, routes and gear,
//!   called with the agent's bearer token passed through unmodified.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod protocol;
pub mod strava;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}

//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::{Error, Result};

/// Strava MCP Gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
}

impl Gateway {
    /// Create a new gateway
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the gateway until Ctrl-C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is invalid, the port cannot be
    /// bound, or the server fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let state = Arc::new(AppState::from_config(&self.config)?);
        let oauth_configured = state.flow.is_configured();
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("STRAVA MCP GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        match &self.config.server.public_url {
            Some(url) => info!(public_url = %url, "Public URL"),
            None => info!("Public URL derived from request headers"),
        }
        info!(api = %self.config.strava.api_base_url, "Strava API");
        if oauth_configured {
            info!(scopes = %self.config.oauth.scopes.join(","), "OAuth delegation enabled");
        } else {
            warn!("OAuth delegation disabled - set STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET and STATE_SECRET");
        }
        info!("  POST /mcp                       (MCP, bearer token required)");
        info!("  GET  /.well-known/oauth-*       (discovery)");
        info!("  *    /oauth/{{register,authorize,callback,token}}");
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

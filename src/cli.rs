//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strava MCP Gateway - Strava API tools behind a stateless OAuth bridge
#[derive(Parser, Debug)]
#[command(name = "strava-mcp-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "STRAVA_MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "STRAVA_MCP_HOST")]
    pub host: Option<String>,

    /// Externally visible base URL used in redirects and discovery documents
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "STRAVA_MCP_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "STRAVA_MCP_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Print the MCP tools exposed by the gateway
    Tools {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

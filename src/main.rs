//! Strava MCP Gateway - Strava API tools for MCP agents behind a stateless
//! OAuth bridge.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use strava_mcp_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
    strava::tools,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Tools { ref format }) => print_tools(format),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Print the tool table
fn print_tools(format: &str) -> ExitCode {
    let definitions = tools::tool_definitions();

    if format == "json" {
        return match serde_json::to_string_pretty(&definitions) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize tools: {e}");
                ExitCode::FAILURE
            }
        };
    }

    println!("{} tools:\n", tools::ROUTES.len());
    for route in tools::ROUTES {
        let method = match route.method {
            tools::RouteMethod::Get => "GET",
            tools::RouteMethod::Put => "PUT",
        };
        println!("  {:<26} {method:<4} {}", route.name, route.path);
        println!("  {:<26} {}", "", route.description);
    }
    ExitCode::SUCCESS
}

async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            if let Some(ref url) = cli.public_url {
                let url = url.trim().trim_end_matches('/');
                if !url.is_empty() {
                    config.server.public_url = Some(url.to_string());
                }
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting Strava MCP Gateway"
    );

    if let Err(e) = Gateway::new(config).run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

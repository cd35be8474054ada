//! MCP Protocol types (tools subset)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Latest MCP protocol version spoken by the gateway
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions the gateway accepts, newest first
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Pick the version to answer `initialize` with: the client's own when we
/// support it, otherwise our latest.
#[must_use]
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_VERSIONS.iter().find(|s| **s == v))
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}

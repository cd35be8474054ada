//! Gateway server implementation

pub mod auth;
mod mcp;
mod router;
mod server;

pub use auth::BearerToken;
pub use router::{AppState, create_router};
pub use server::Gateway;

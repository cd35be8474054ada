//! Strava v3 API access
//!
//! [`StravaClient`] performs single bearer-authenticated calls; [`tools`]
//! maps those calls onto MCP tools.

mod client;
pub mod tools;

pub use client::{StravaApiError, StravaClient, StravaFieldError};

//! Stateless MCP Streamable-HTTP endpoint
//!
//! Each POST carries exactly one JSON-RPC message. No session is created and
//! no `mcp-session-id` is issued.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::auth::BearerToken;
use super::router::AppState;
use crate::error::rpc_codes;
use crate::protocol::{
    IncomingMessage, Info, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ServerCapabilities, ToolsCallParams, ToolsCapability, ToolsListResult, negotiate_version,
    parse_message,
};
use crate::strava::{StravaClient, tools};
use crate::Error;

const INSTRUCTIONS: &str = "Tools for reading the authenticated athlete's Strava data: \
profile, stats, zones, activities (laps, zones, streams, kudos), segments and efforts, \
clubs, routes and gear. IDs are numeric except gear IDs (e.g. b12345).";

/// POST /mcp
pub async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    body: Bytes,
) -> Response {
    let request = match parse_message(&body) {
        Ok(IncomingMessage::Request(request)) => request,
        Ok(IncomingMessage::Notification(notification)) => {
            debug!(method = %notification.method, "Notification received");
            return StatusCode::ACCEPTED.into_response();
        }
        Err(response) => return (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    debug!(method = %request.method, id = %request.id, "MCP request");
    Json(dispatch(&state, &token, request).await).into_response()
}

/// GET and DELETE /mcp
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(JsonRpcResponse::error(
            None,
            rpc_codes::SERVER_ERROR_START,
            "Method not allowed.",
        )),
    )
        .into_response()
}

async fn dispatch(state: &AppState, token: &str, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    let result = match request.method.as_str() {
        "initialize" => initialize(request.params),
        "ping" => Ok(json!({})),
        "tools/list" => to_value(&ToolsListResult {
            tools: tools::tool_definitions(),
        }),
        "tools/call" => call_tool(state, token, request.params).await,
        other => Err(Error::json_rpc(
            rpc_codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    };

    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(Error::JsonRpc { code, message }) => JsonRpcResponse::error(Some(id), code, message),
        Err(e) => {
            warn!(method = %request.method, error = %e, "MCP request failed");
            JsonRpcResponse::error(Some(id), e.to_rpc_code(), e.to_string())
        }
    }
}

fn initialize(params: Option<Value>) -> crate::Result<Value> {
    let params: InitializeParams = match params {
        Some(p) => parse_params(p)?,
        None => InitializeParams::default(),
    };
    let version = negotiate_version(params.protocol_version.as_deref());

    to_value(&InitializeResult {
        protocol_version: version.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: false,
            }),
        },
        server_info: Info {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Strava MCP Gateway".to_string()),
        },
        instructions: Some(INSTRUCTIONS.to_string()),
    })
}

async fn call_tool(state: &AppState, token: &str, params: Option<Value>) -> crate::Result<Value> {
    let params: ToolsCallParams = parse_params(
        params.ok_or_else(|| Error::json_rpc(rpc_codes::INVALID_PARAMS, "Missing params"))?,
    )?;

    let client = StravaClient::new(state.http.clone(), state.strava_api_base.as_str(), token);
    let result = tools::call_tool(&client, &params.name, &params.arguments).await?;
    to_value(&result)
}

fn parse_params<T: DeserializeOwned>(params: Value) -> crate::Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::json_rpc(rpc_codes::INVALID_PARAMS, format!("Invalid params: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> crate::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

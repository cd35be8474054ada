//! MCP tools backed by Strava API routes
//!
//! Every tool is one row in [`ROUTES`]: an HTTP method, a path template and
//! the arguments it takes. Tool schemas and request building are both derived
//! from that row, so the two cannot drift apart.

use reqwest::Method;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{StravaApiError, StravaClient};
use crate::error::rpc_codes;
use crate::protocol::{Content, Tool, ToolAnnotations, ToolsCallResult};
use crate::{Error, Result};

/// HTTP method of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    /// Read
    Get,
    /// Update
    Put,
}

impl RouteMethod {
    fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Put => Method::PUT,
        }
    }
}

/// Where an argument goes in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    /// Substituted into `{name}` in the path
    Path,
    /// Query string
    Query,
    /// Form-encoded body
    Form,
}

/// JSON type of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Integer
    Integer,
    /// Floating point
    Number,
    /// String
    String,
    /// Boolean
    Boolean,
}

impl ParamType {
    fn schema_name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
        }
    }
}

/// One tool argument
#[derive(Debug, Clone, Copy)]
pub struct ToolParam {
    /// Argument name (also the Strava parameter name)
    pub name: &'static str,
    /// Where it is sent
    pub location: ParamLocation,
    /// Expected JSON type
    pub kind: ParamType,
    /// Whether the tool fails without it
    pub required: bool,
    /// Schema description
    pub description: &'static str,
}

/// A Strava route exposed as an MCP tool
#[derive(Debug, Clone, Copy)]
pub struct ToolRoute {
    /// Tool name
    pub name: &'static str,
    /// Tool description
    pub description: &'static str,
    /// HTTP method
    pub method: RouteMethod,
    /// Path relative to the API base, with `{param}` placeholders
    pub path: &'static str,
    /// Arguments
    pub params: &'static [ToolParam],
}

const fn path_id(description: &'static str) -> ToolParam {
    ToolParam {
        name: "id",
        location: ParamLocation::Path,
        kind: ParamType::Integer,
        required: true,
        description,
    }
}

const fn query(name: &'static str, kind: ParamType, description: &'static str) -> ToolParam {
    ToolParam {
        name,
        location: ParamLocation::Query,
        kind,
        required: false,
        description,
    }
}

const PAGE: ToolParam = query("page", ParamType::Integer, "Page number (1-based)");
const PER_PAGE: ToolParam = query("per_page", ParamType::Integer, "Items per page (max 200)");

/// All tools, in listing order
pub static ROUTES: &[ToolRoute] = &[
    ToolRoute {
        name: "get_athlete_profile",
        description: "Get the profile of the authenticated athlete",
        method: RouteMethod::Get,
        path: "/athlete",
        params: &[],
    },
    ToolRoute {
        name: "get_athlete_stats",
        description: "Get recent, year-to-date and all-time totals for the authenticated athlete",
        method: RouteMethod::Get,
        path: "/athletes/{id}/stats",
        params: &[path_id("ID of the authenticated athlete")],
    },
    ToolRoute {
        name: "get_athlete_zones",
        description: "Get the heart rate and power zones of the authenticated athlete",
        method: RouteMethod::Get,
        path: "/athlete/zones",
        params: &[],
    },
    ToolRoute {
        name: "list_athlete_activities",
        description: "List activities of the authenticated athlete, newest first",
        method: RouteMethod::Get,
        path: "/athlete/activities",
        params: &[
            query("before", ParamType::Integer, "Only activities before this epoch timestamp"),
            query("after", ParamType::Integer, "Only activities after this epoch timestamp"),
            PAGE,
            PER_PAGE,
        ],
    },
    ToolRoute {
        name: "get_activity",
        description: "Get a detailed activity",
        method: RouteMethod::Get,
        path: "/activities/{id}",
        params: &[
            path_id("Activity ID"),
            query("include_all_efforts", ParamType::Boolean, "Include all segment efforts"),
        ],
    },
    ToolRoute {
        name: "get_activity_laps",
        description: "List the laps of an activity",
        method: RouteMethod::Get,
        path: "/activities/{id}/laps",
        params: &[path_id("Activity ID")],
    },
    ToolRoute {
        name: "get_activity_zones",
        description: "Get heart rate and power zone distribution of an activity",
        method: RouteMethod::Get,
        path: "/activities/{id}/zones",
        params: &[path_id("Activity ID")],
    },
    ToolRoute {
        name: "get_activity_streams",
        description: "Get raw data streams (time, distance, latlng, heartrate, watts, ...) of an activity",
        method: RouteMethod::Get,
        path: "/activities/{id}/streams",
        params: &[
            path_id("Activity ID"),
            ToolParam {
                name: "keys",
                location: ParamLocation::Query,
                kind: ParamType::String,
                required: true,
                description: "Comma-separated stream types, e.g. time,heartrate,watts",
            },
            query("key_by_type", ParamType::Boolean, "Key the result by stream type"),
        ],
    },
    ToolRoute {
        name: "list_activity_kudoers",
        description: "List athletes who gave kudos to an activity",
        method: RouteMethod::Get,
        path: "/activities/{id}/kudos",
        params: &[path_id("Activity ID"), PAGE, PER_PAGE],
    },
    ToolRoute {
        name: "list_starred_segments",
        description: "List segments starred by the authenticated athlete",
        method: RouteMethod::Get,
        path: "/segments/starred",
        params: &[PAGE, PER_PAGE],
    },
    ToolRoute {
        name: "get_segment",
        description: "Get a segment",
        method: RouteMethod::Get,
        path: "/segments/{id}",
        params: &[path_id("Segment ID")],
    },
    ToolRoute {
        name: "explore_segments",
        description: "Find popular segments within a bounding box",
        method: RouteMethod::Get,
        path: "/segments/explore",
        params: &[
            ToolParam {
                name: "bounds",
                location: ParamLocation::Query,
                kind: ParamType::String,
                required: true,
                description: "South-west and north-east corners: sw_lat,sw_lng,ne_lat,ne_lng",
            },
            query("activity_type", ParamType::String, "running or riding"),
            query("min_cat", ParamType::Integer, "Minimum climb category"),
            query("max_cat", ParamType::Integer, "Maximum climb category"),
        ],
    },
    ToolRoute {
        name: "star_segment",
        description: "Star or unstar a segment for the authenticated athlete",
        method: RouteMethod::Put,
        path: "/segments/{id}/starred",
        params: &[
            path_id("Segment ID"),
            ToolParam {
                name: "starred",
                location: ParamLocation::Form,
                kind: ParamType::Boolean,
                required: true,
                description: "true to star, false to unstar",
            },
        ],
    },
    ToolRoute {
        name: "list_segment_efforts",
        description: "List the authenticated athlete's efforts on a segment",
        method: RouteMethod::Get,
        path: "/segment_efforts",
        params: &[
            ToolParam {
                name: "segment_id",
                location: ParamLocation::Query,
                kind: ParamType::Integer,
                required: true,
                description: "Segment ID",
            },
            query("start_date_local", ParamType::String, "ISO 8601 start of range"),
            query("end_date_local", ParamType::String, "ISO 8601 end of range"),
            PER_PAGE,
        ],
    },
    ToolRoute {
        name: "get_segment_effort",
        description: "Get a segment effort",
        method: RouteMethod::Get,
        path: "/segment_efforts/{id}",
        params: &[path_id("Segment effort ID")],
    },
    ToolRoute {
        name: "list_athlete_clubs",
        description: "List clubs the authenticated athlete belongs to",
        method: RouteMethod::Get,
        path: "/athlete/clubs",
        params: &[PAGE, PER_PAGE],
    },
    ToolRoute {
        name: "get_club",
        description: "Get a club",
        method: RouteMethod::Get,
        path: "/clubs/{id}",
        params: &[path_id("Club ID")],
    },
    ToolRoute {
        name: "list_club_members",
        description: "List members of a club",
        method: RouteMethod::Get,
        path: "/clubs/{id}/members",
        params: &[path_id("Club ID"), PAGE, PER_PAGE],
    },
    ToolRoute {
        name: "list_club_activities",
        description: "List recent activities of club members",
        method: RouteMethod::Get,
        path: "/clubs/{id}/activities",
        params: &[path_id("Club ID"), PAGE, PER_PAGE],
    },
    ToolRoute {
        name: "list_athlete_routes",
        description: "List routes created by an athlete",
        method: RouteMethod::Get,
        path: "/athletes/{id}/routes",
        params: &[path_id("Athlete ID"), PAGE, PER_PAGE],
    },
    ToolRoute {
        name: "get_route",
        description: "Get a route",
        method: RouteMethod::Get,
        path: "/routes/{id}",
        params: &[path_id("Route ID")],
    },
    ToolRoute {
        name: "get_gear",
        description: "Get a bike or pair of shoes",
        method: RouteMethod::Get,
        path: "/gear/{id}",
        params: &[ToolParam {
            name: "id",
            location: ParamLocation::Path,
            kind: ParamType::String,
            required: true,
            description: "Gear ID, e.g. b12345",
        }],
    },
];

/// Look up a route by tool name
#[must_use]
pub fn find_route(name: &str) -> Option<&'static ToolRoute> {
    ROUTES.iter().find(|r| r.name == name)
}

impl ToolRoute {
    /// JSON Schema of the tool's arguments
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.params {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.schema_name(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// MCP tool definition
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        let read_only = self.method == RouteMethod::Get;
        Tool {
            name: self.name.to_string(),
            title: None,
            description: Some(self.description.to_string()),
            input_schema: self.input_schema(),
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(read_only),
                destructive_hint: Some(false),
                idempotent_hint: Some(true),
                open_world_hint: Some(true),
            }),
        }
    }

    /// Resolve arguments into a concrete request
    fn build_request(&self, arguments: &Value) -> Result<PreparedRequest> {
        let args = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(invalid_params("Tool arguments must be an object")),
        };

        if let Some(unknown) = args
            .keys()
            .find(|k| !self.params.iter().any(|p| p.name == k.as_str()))
        {
            return Err(invalid_params(format!(
                "Unknown argument for {}: {unknown}",
                self.name
            )));
        }

        let mut request = PreparedRequest {
            method: self.method.as_method(),
            path: self.path.to_string(),
            query: Vec::new(),
            form: Vec::new(),
        };

        for param in self.params {
            let value = match args.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(invalid_params(format!(
                        "Missing required argument: {}",
                        param.name
                    )));
                }
                None | Some(Value::Null) => continue,
                Some(value) => coerce(param, value)?,
            };

            match param.location {
                ParamLocation::Path => {
                    let placeholder = format!("{{{}}}", param.name);
                    request.path = request.path.replace(&placeholder, &encode_segment(&value));
                }
                ParamLocation::Query => request.query.push((param.name.to_string(), value)),
                ParamLocation::Form => request.form.push((param.name.to_string(), value)),
            }
        }

        Ok(request)
    }
}

struct PreparedRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
}

/// Check an argument against its declared type and render it as a string
fn coerce(param: &ToolParam, value: &Value) -> Result<String> {
    let rendered = match (param.kind, value) {
        (ParamType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        (ParamType::Integer, Value::String(s)) if s.parse::<i64>().is_ok() => Some(s.clone()),
        (ParamType::Number, Value::Number(n)) => Some(n.to_string()),
        (ParamType::Number, Value::String(s)) if s.parse::<f64>().is_ok() => Some(s.clone()),
        (ParamType::Boolean, Value::Bool(b)) => Some(b.to_string()),
        (ParamType::Boolean, Value::String(s)) if s == "true" || s == "false" => Some(s.clone()),
        (ParamType::String, Value::String(s)) => Some(s.clone()),
        (ParamType::String, Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    rendered.ok_or_else(|| {
        invalid_params(format!(
            "Argument {} must be of type {}",
            param.name,
            param.kind.schema_name()
        ))
    })
}

/// Percent-encode a single path segment
fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn invalid_params(message: impl Into<String>) -> Error {
    Error::json_rpc(rpc_codes::INVALID_PARAMS, message)
}

/// Definitions of every tool, for `tools/list`
#[must_use]
pub fn tool_definitions() -> Vec<Tool> {
    ROUTES.iter().map(ToolRoute::to_tool).collect()
}

/// Run a tool against the Strava API
///
/// Strava faults come back as an `isError` result so the agent can read
/// them; argument problems and unknown tools are JSON-RPC errors.
///
/// # Errors
///
/// [`Error::JsonRpc`] with `-32602` for an unknown tool or bad arguments,
/// [`Error::Http`] when Strava cannot be reached.
pub async fn call_tool(client: &StravaClient, name: &str, arguments: &Value) -> Result<ToolsCallResult> {
    let route = find_route(name).ok_or_else(|| invalid_params(format!("Unknown tool: {name}")))?;
    let request = route.build_request(arguments)?;

    debug!(tool = name, method = %request.method, path = %request.path, "Calling Strava tool");

    match client
        .request(request.method, &request.path, &request.query, &request.form)
        .await
    {
        Ok(value) => {
            let text = if value.is_null() {
                "OK".to_string()
            } else {
                serde_json::to_string_pretty(&value)?
            };
            Ok(ToolsCallResult {
                content: vec![Content::text(text)],
                is_error: false,
            })
        }
        Err(Error::StravaApi(err)) => Ok(ToolsCallResult {
            content: vec![Content::text(describe_fault(&err))],
            is_error: true,
        }),
        Err(e) => Err(e),
    }
}

fn describe_fault(err: &StravaApiError) -> String {
    let mut text = err.to_string();
    for field in &err.errors {
        text.push_str("\n- ");
        text.push_str(&field.to_string());
    }
    text
}

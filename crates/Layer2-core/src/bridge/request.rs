//! Typed tool requests
//!
//! Tool parameters enter the bridge as explicit typed structures, validated
//! before serialization. Known tools get strict parameter structs
//! (`deny_unknown_fields`, so a typo fails fast instead of being silently
//! dropped); everything else goes through the `Custom` variant, whose
//! parameters must at least be a JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use relay_foundation::{Error, Result};

/// Parameters for `get_current_time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeParams {
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Parameters for `get_weather`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeatherParams {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// Parameters for `search_memory`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySearchParams {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    10
}

/// A validated tool invocation, keyed by tool name
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    GetCurrentTime(TimeParams),
    GetWeather(WeatherParams),
    SearchMemory(MemorySearchParams),
    /// Tools the bridge does not know statically; parameters must be an
    /// object so they survive canonicalization.
    Custom { name: String, params: Map<String, Value> },
}

impl ToolRequest {
    /// Validate a `(tool_name, parameters)` pair into a typed request.
    ///
    /// Known tools are parsed strictly; unknown fields or wrong types fail
    /// here, before anything is serialized or sent.
    pub fn parse(tool_name: &str, params: Value) -> Result<Self> {
        match tool_name {
            "get_current_time" => serde_json::from_value(normalize(params))
                .map(ToolRequest::GetCurrentTime)
                .map_err(|e| invalid(tool_name, &e)),
            "get_weather" => serde_json::from_value(normalize(params))
                .map(ToolRequest::GetWeather)
                .map_err(|e| invalid(tool_name, &e)),
            "search_memory" => serde_json::from_value(normalize(params))
                .map(ToolRequest::SearchMemory)
                .map_err(|e| invalid(tool_name, &e)),
            _ => Self::custom(tool_name, params),
        }
    }

    /// Build a request for a tool the bridge has no static schema for
    pub fn custom(name: &str, params: Value) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRequest("tool name is empty".to_string()));
        }
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidRequest(format!(
                    "parameters for '{name}' must be an object, got {}",
                    json_type(&other)
                )));
            }
        };
        Ok(ToolRequest::Custom {
            name: name.to_string(),
            params,
        })
    }

    /// The wire name of the tool
    pub fn tool_name(&self) -> &str {
        match self {
            ToolRequest::GetCurrentTime(_) => "get_current_time",
            ToolRequest::GetWeather(_) => "get_weather",
            ToolRequest::SearchMemory(_) => "search_memory",
            ToolRequest::Custom { name, .. } => name,
        }
    }

    /// Canonical parameter object for serialization and cache keying
    pub fn parameters(&self) -> Result<Value> {
        let value = match self {
            ToolRequest::GetCurrentTime(p) => serde_json::to_value(p)?,
            ToolRequest::GetWeather(p) => serde_json::to_value(p)?,
            ToolRequest::SearchMemory(p) => serde_json::to_value(p)?,
            ToolRequest::Custom { params, .. } => Value::Object(params.clone()),
        };
        Ok(value)
    }
}

fn normalize(params: Value) -> Value {
    // Absent parameters mean "all defaults"
    if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    }
}

fn invalid(tool_name: &str, e: &serde_json::Error) -> Error {
    Error::InvalidRequest(format!("invalid parameters for '{tool_name}': {e}"))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

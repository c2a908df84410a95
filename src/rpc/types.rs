//! JSON-RPC 2.0 types as spoken by MCP servers.
//!
//! Payloads (`params`, `result`, error `data`) stay as [`serde_json::Value`]
//! so arbitrary tool arguments round-trip untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Method name of an MCP tool invocation.
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// JSON-RPC protocol version written by this crate.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id of a JSON-RPC message.
///
/// Integer and string ids are distinct keys: `1` and `"1"` never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Int(i64),
    Str(String),
    Null,
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "\"{value}\""),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for RpcId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RpcId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// A request carrying an id, expecting a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    /// Create a request with the current protocol version.
    #[must_use]
    pub fn new(id: impl Into<RpcId>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Create a `tools/call` request for the named tool.
    #[must_use]
    pub fn tool_call(
        id: impl Into<RpcId>,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self::new(
            id,
            TOOLS_CALL_METHOD,
            serde_json::json!({ "name": name, "arguments": arguments }),
        )
    }
}

/// Error object of a failed JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl PartialEq for RpcError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

/// Response to a request, matched by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    /// `Some(Value::Null)` for an explicit `"result": null`, `None` when the
    /// key is absent.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl RpcResponse {
    /// Returns true if the response carries no error object.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Fire-and-forget message without an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A classified line of JSON-RPC traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    Request(RpcRequest),
    Response(RpcResponse),
    Notification(RpcNotification),
    /// Bytes that matched no message shape, kept for diagnostics.
    Invalid(Vec<u8>),
}

impl RpcMessage {
    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Notification(_) => "notification",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Tool name and arguments of a `tools/call` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallInfo {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Human-readable outcome extracted from a tool response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultContent {
    pub content: String,
    pub is_error: bool,
}

/// Structured build outcome returned by `xcode_build` / `xcode_run`.
///
/// Every decode gets a fresh id, so identical payloads are still distinct
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,
    pub success: bool,
    #[serde(default)]
    pub app_path: Option<String>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub sdk: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub warnings: Option<u32>,
    #[serde(default)]
    pub errors: Option<u32>,
    #[serde(default)]
    pub error_output: Option<String>,
}

impl BuildResult {
    /// Reported build duration, if the tool included one.
    #[must_use]
    pub fn duration(&self) -> Option<std::time::Duration> {
        self.duration_ms.map(std::time::Duration::from_millis)
    }
}

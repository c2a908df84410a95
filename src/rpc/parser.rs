//! Line classifier for JSON-RPC traffic.
//!
//! Each framed line is tried as a response, then a request, then a
//! notification. Anything else becomes [`RpcMessage::Invalid`]; parse
//! failures never surface as errors because a noisy child must not be able
//! to interrupt the stream.

use serde_json::Value;

use super::types::{
    BuildResult, RpcMessage, RpcNotification, RpcRequest, RpcResponse, ToolCallInfo,
    ToolResultContent, TOOLS_CALL_METHOD,
};

/// Stateless JSON-RPC line classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcParser;

impl RpcParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify one line of JSON-RPC traffic.
    ///
    /// Responses win over requests: a payload carrying `id`, `method` and
    /// `result` is a response because that is what the server mostly sends.
    /// A `result` key that is present but `null` still counts.
    #[must_use]
    pub fn parse(&self, line: &[u8]) -> RpcMessage {
        if let Ok(response) = serde_json::from_slice::<RpcResponse>(line) {
            if response.result.is_some() || response.error.is_some() {
                return RpcMessage::Response(response);
            }
        }

        if let Ok(request) = serde_json::from_slice::<RpcRequest>(line) {
            if request.id.is_some() {
                return RpcMessage::Request(request);
            }
        }

        // An absent or null id means nobody is waiting for an answer.
        if let Ok(notification) = serde_json::from_slice::<RpcNotification>(line) {
            return RpcMessage::Notification(notification);
        }

        RpcMessage::Invalid(line.to_vec())
    }

    /// Classify a line of text.
    #[must_use]
    pub fn parse_str(&self, line: &str) -> RpcMessage {
        self.parse(line.as_bytes())
    }

    /// Extract tool name and arguments from a `tools/call` request.
    ///
    /// Returns `None` for any other method or a malformed `params`; the
    /// request itself is still valid.
    #[must_use]
    pub fn extract_tool_call_info(&self, request: &RpcRequest) -> Option<ToolCallInfo> {
        if request.method != TOOLS_CALL_METHOD {
            return None;
        }

        let Some(Value::Object(params)) = &request.params else {
            return None;
        };
        let Some(Value::String(name)) = params.get("name") else {
            return None;
        };

        let arguments = match params.get("arguments") {
            Some(Value::Object(args)) => args.clone(),
            _ => serde_json::Map::new(),
        };

        Some(ToolCallInfo {
            name: name.clone(),
            arguments,
        })
    }

    /// Extract displayable result text from a tool response.
    ///
    /// Prefers the MCP `content[].text` items joined by newlines, falls back
    /// to the raw result as JSON, and to the RPC error message when there is
    /// no result at all.
    #[must_use]
    pub fn extract_tool_result(&self, response: &RpcResponse) -> Option<ToolResultContent> {
        let Some(result) = &response.result else {
            return response.error.as_ref().map(|error| ToolResultContent {
                content: error.message.clone(),
                is_error: true,
            });
        };

        if result.is_null() {
            return Some(ToolResultContent {
                content: String::new(),
                is_error: false,
            });
        }

        if let Value::Object(map) = result {
            let is_error = map
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            if let Some(Value::Array(items)) = map.get("content") {
                let parts: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .collect();
                if !parts.is_empty() {
                    return Some(ToolResultContent {
                        content: parts.join("\n"),
                        is_error,
                    });
                }
            }
        }

        serde_json::to_string(result)
            .ok()
            .map(|content| ToolResultContent {
                content,
                is_error: false,
            })
    }

    /// Decode the structured build result embedded in the first content item.
    #[must_use]
    pub fn extract_build_result(&self, response: &RpcResponse) -> Option<BuildResult> {
        let text = response
            .result
            .as_ref()?
            .get("content")?
            .as_array()?
            .first()?
            .get("text")?
            .as_str()?;

        match serde_json::from_str::<BuildResult>(text) {
            Ok(build) => Some(build),
            Err(e) => {
                tracing::debug!(error = %e, "Build tool content is not a build result");
                None
            }
        }
    }
}

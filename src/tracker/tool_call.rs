//! Tool call records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tool names that produce a structured build result.
pub const BUILD_TOOLS: [&str; 2] = ["xcode_build", "xcode_run"];

/// Which agent reported a tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TelemetrySource {
    ClaudeCode,
    Codex,
    #[default]
    Unknown,
}

/// Outcome of a finished tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallResult {
    Success { content: String },
    Failure { error: String },
}

impl ToolCallResult {
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        Self::Success {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One tool invocation by the supervised server.
///
/// A call is active until `end_time` is set. Completion happens once: see
/// [`ToolCall::complete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: Uuid,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolCallResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub source: TelemetrySource,
}

impl ToolCall {
    /// Create an active call started now.
    #[must_use]
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self::started_at(tool_name, serde_json::Map::new(), Utc::now())
    }

    /// Create an active call with arguments and an explicit start time.
    #[must_use]
    pub fn started_at(
        tool_name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            arguments,
            start_time,
            end_time: None,
            result: None,
            token_count: None,
            input_tokens: None,
            output_tokens: None,
            cost_usd: None,
            source: TelemetrySource::Unknown,
        }
    }

    /// Set the reporting agent.
    #[must_use]
    pub fn with_source(mut self, source: TelemetrySource) -> Self {
        self.source = source;
        self
    }

    /// Finish an active call.
    ///
    /// Returns false and leaves the record untouched if it already ended.
    pub fn complete(&mut self, end_time: DateTime<Utc>, result: ToolCallResult) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(end_time);
        self.result = Some(result);
        true
    }

    /// Wall time between start and end, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let end = self.end_time?;
        Some((end - self.start_time).to_std().unwrap_or(Duration::ZERO))
    }

    /// Duration for display: `"250ms"`, `"1.5s"`, `"2m 5s"`, or `"-"`.
    #[must_use]
    pub fn formatted_duration(&self) -> String {
        self.duration()
            .map_or_else(|| "-".to_string(), format_duration)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(ToolCallResult::is_success)
    }

    #[must_use]
    pub fn is_build_tool(&self) -> bool {
        is_build_tool(&self.tool_name)
    }
}

/// Returns true for tools that report structured build results.
#[must_use]
pub fn is_build_tool(name: &str) -> bool {
    BUILD_TOOLS.contains(&name)
}

/// Format a duration the way the status line shows it.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let whole = duration.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    }
}

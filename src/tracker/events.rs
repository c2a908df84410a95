//! Tool lifecycle events reported on the server's stderr.
//!
//! The server may interleave these JSON lines with ordinary log output:
//!
//! ```text
//! {"event":"tool_start","tool":"xcode_build","id":"b1"}
//! {"event":"tool_end","tool":"xcode_build","id":"b1","success":true,"duration_ms":5000,"tokens":42}
//! ```

use serde::{Deserialize, Serialize};

/// A telemetry event decoded from one stderr line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToolEvent {
    ToolStart {
        tool: String,
        id: String,
    },
    ToolEnd {
        tool: String,
        id: String,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        tokens: Option<u64>,
    },
}

impl ToolEvent {
    /// Decode a stderr line, returning `None` for anything that is not a
    /// tool event.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Correlation key of the event.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::ToolStart { id, .. } | Self::ToolEnd { id, .. } => id,
        }
    }

    /// Name of the tool the event refers to.
    #[must_use]
    pub fn tool(&self) -> &str {
        match self {
            Self::ToolStart { tool, .. } | Self::ToolEnd { tool, .. } => tool,
        }
    }
}

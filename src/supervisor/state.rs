//! Server lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed(String),
    Error(String),
}

impl ServerState {
    /// Starting, running or stopping.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Text shown to the user, e.g. `"Crashed: Exit code: 1"`.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Stopped => "Stopped".to_string(),
            Self::Starting => "Starting...".to_string(),
            Self::Running => "Running".to_string(),
            Self::Stopping => "Stopping...".to_string(),
            Self::Crashed(reason) => format!("Crashed: {reason}"),
            Self::Error(message) => format!("Error: {message}"),
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

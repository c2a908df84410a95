//! Configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Smallest accepted recent tool call limit.
pub const MIN_RECENT_TOOL_CALLS: usize = 5;

/// Largest accepted recent tool call limit.
pub const MAX_RECENT_TOOL_CALLS: usize = 50;

/// How the MCP server is exposed by the child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

/// Child process invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the MCP server executable.
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    /// Transport mode passed to the server.
    #[serde(default)]
    pub transport: Transport,
    /// Port used in HTTP mode.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Working directory for the child. Defaults to the home directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/bridge4simulator-xcauto")
}

fn default_http_port() -> u16 {
    8765
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            transport: Transport::default(),
            http_port: default_http_port(),
            working_dir: None,
        }
    }
}

impl ServerConfig {
    /// Command-line arguments for the configured transport.
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        match self.transport {
            Transport::Stdio => vec!["mcp".to_string()],
            Transport::Http => vec![
                "mcp".to_string(),
                "--http".to_string(),
                "--port".to_string(),
                self.http_port.to_string(),
            ],
        }
    }

    /// The executable path, if it points at an existing file.
    #[must_use]
    pub fn executable_path(&self) -> Option<&Path> {
        self.binary_path
            .is_file()
            .then_some(self.binary_path.as_path())
    }

    /// Directory the child is started in.
    #[must_use]
    pub fn resolved_working_dir(&self) -> Option<PathBuf> {
        self.working_dir.clone().or_else(dirs::home_dir)
    }

    /// Base URL of the server in HTTP mode.
    #[must_use]
    pub fn http_url(&self) -> Option<String> {
        (self.transport == Transport::Http).then(|| format!("http://localhost:{}", self.http_port))
    }
}

/// Crash-restart policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Restart automatically after a non-zero exit.
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,
    /// Consecutive automatic restarts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_auto_restart() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            auto_restart: default_auto_restart(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Tool call history settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Number of recent tool calls kept for display.
    #[serde(default = "default_recent_limit")]
    pub recent_tool_calls_limit: usize,
}

fn default_recent_limit() -> usize {
    10
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            recent_tool_calls_limit: default_recent_limit(),
        }
    }
}

impl TrackerConfig {
    /// The limit clamped to the supported range.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        let limit = self
            .recent_tool_calls_limit
            .clamp(MIN_RECENT_TOOL_CALLS, MAX_RECENT_TOOL_CALLS);
        if limit != self.recent_tool_calls_limit {
            tracing::warn!(
                configured = self.recent_tool_calls_limit,
                effective = limit,
                "Recent tool call limit out of range, clamping"
            );
        }
        limit
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

//! Colored terminal output for `agent-notch run`.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::rpc::BuildResult;
use crate::supervisor::ServerState;
use crate::tracker::{format_duration, TokenTotals, ToolCall};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to at most `max_len` characters, adding an ellipsis if
/// truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Format tool arguments as `key=value` pairs, truncating long values.
#[must_use]
pub fn format_arguments(arguments: &serde_json::Map<String, serde_json::Value>) -> String {
    let pairs: Vec<String> = arguments
        .iter()
        .map(|(k, v)| {
            let value_str = match v {
                serde_json::Value::String(s) => truncate(s, 50),
                other => truncate(&other.to_string(), 50),
            };
            format!("{k}={value_str}")
        })
        .collect();
    truncate(&pairs.join(", "), DEFAULT_MAX_LEN)
}

/// Print a server state change.
pub fn print_state(state: &ServerState, pid: Option<u32>) {
    let label = match state {
        ServerState::Running => "[SERVER]".green().bold().to_string(),
        ServerState::Crashed(_) | ServerState::Error(_) => "[SERVER]".red().bold().to_string(),
        _ => "[SERVER]".blue().bold().to_string(),
    };
    let pid = pid.map_or(String::new(), |pid| format!("pid={pid}"));
    println!(
        "{} {} {} {}",
        timestamp().dimmed(),
        label,
        state.display_text(),
        pid.dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a restart notice.
pub fn print_restart(attempt: u32) {
    println!(
        "{} {} attempt {}",
        timestamp().dimmed(),
        "[RESTART]".yellow().bold(),
        attempt
    );
    let _ = io::stdout().flush();
}

/// Print a tool call. Active calls show as started, finished ones with
/// their outcome and duration.
pub fn print_tool_call(call: &ToolCall) {
    let ts = timestamp();
    if call.is_active() {
        println!(
            "{} {} {} ({})",
            ts.dimmed(),
            "[TOOL]".cyan().bold(),
            call.tool_name.bold(),
            format_arguments(&call.arguments).dimmed()
        );
    } else {
        let tokens = call
            .token_count
            .map_or(String::new(), |t| format!("tokens={t}"));
        let outcome = if call.is_success() {
            "[DONE]".green().bold().to_string()
        } else {
            "[FAIL]".red().bold().to_string()
        };
        println!(
            "{} {} {} {} {}",
            ts.dimmed(),
            outcome,
            call.tool_name.bold(),
            call.formatted_duration(),
            tokens.dimmed()
        );
    }
    let _ = io::stdout().flush();
}

/// Print a decoded build result.
pub fn print_build_result(build: &BuildResult) {
    let ts = timestamp();
    let duration = build
        .duration()
        .map_or_else(|| "-".to_string(), format_duration);
    let details = format!(
        "warnings={} errors={}",
        build.warnings.unwrap_or(0),
        build.errors.unwrap_or(0)
    );
    if build.success {
        println!(
            "{} {} succeeded in {} {}",
            ts.dimmed(),
            "[BUILD]".green().bold(),
            duration,
            details.dimmed()
        );
    } else {
        println!(
            "{} {} failed after {} {}",
            ts.dimmed(),
            "[BUILD]".red().bold(),
            duration,
            details.dimmed()
        );
        if let Some(output) = build.error_output.as_deref().filter(|o| !o.is_empty()) {
            println!("{}", truncate(output, 500).red());
        }
    }
    let _ = io::stdout().flush();
}

/// Print token totals.
pub fn print_token_totals(totals: &TokenTotals) {
    println!(
        "{} {} tokens={} in={} out={} cost=${:.4}",
        timestamp().dimmed(),
        "[TOKENS]".magenta().bold(),
        totals.tokens,
        totals.input_tokens,
        totals.output_tokens,
        totals.cost_usd
    );
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}

//! Tool call tracking for the supervised MCP server.

mod events;
mod tool_call;
#[allow(clippy::module_inception)]
mod tracker;

pub use events::ToolEvent;
pub use tool_call::*;
pub use tracker::*;

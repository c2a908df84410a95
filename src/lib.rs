//! Agent Notch - supervision and live status for a local MCP server.

pub mod config;
pub mod display;
pub mod process;
pub mod rpc;
pub mod supervisor;
pub mod tracker;

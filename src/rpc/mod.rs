//! JSON-RPC 2.0 message types and the line classifier.

mod parser;
mod types;

pub use parser::*;
pub use types::*;

//! Coordinator actor and the server lifecycle state it publishes.

mod coordinator;
mod state;

pub use coordinator::*;
pub use state::*;

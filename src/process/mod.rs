//! Child process supervision: spawning, output framing and crash restarts.

mod error;
mod framer;
mod manager;
mod monitor;

pub use error::ProcessError;
pub use framer::LineFramer;
pub use manager::*;
pub use monitor::*;

//! Agentic tool loop: one request in, as many tool rounds as needed, one answer out.

pub mod events;
pub mod runner;
pub mod types;

pub use events::LoopEvent;
pub use runner::{ToolLoop, DEFAULT_MAX_TOOL_ROUNDS};
pub use types::LoopOutcome;

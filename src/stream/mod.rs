//! Streaming reassembly: tool-call and completion accumulators, usage
//! estimation, and the bounded pump feeding them.

pub mod completion;
pub mod estimate;
pub mod pump;
pub mod tool_calls;

pub use completion::CompletionAccumulator;
pub use pump::{StreamHandle, StreamPump, DEFAULT_STREAM_BUFFER};
pub use tool_calls::{PartialToolCall, ToolCallAccumulator};

//! Convenience re-exports for common use.

pub use crate::agent_loop::{LoopEvent, LoopOutcome, ToolLoop};
pub use crate::config::BridgeConfig;
pub use crate::context::{ExecutionContext, RequestEnv};
pub use crate::emulation::{
    ResponseEvent, ResponseEventStream, ResponseObject, ResponsesEmulator, ResponsesRequest,
};
pub use crate::error::{BridgeError, Result};
pub use crate::provider::{ProviderCompleter, ProviderRequest, ProviderResponse};
pub use crate::responses::{ResponseManager, ResponseStatus};
pub use crate::stream::CompletionAccumulator;
pub use crate::tools::{
    AgentTool, LocalTools, Tool, ToolArguments, ToolObserver, ToolParameters, ToolProvider,
    ToolSet,
};
pub use crate::types::{
    ChatCompletionChunk, Conversation, FinishReason, GenerationSettings, Message, Role, ToolCall,
    Usage,
};

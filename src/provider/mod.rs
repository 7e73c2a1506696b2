//! Backend completer trait and the reference OpenAI-compatible implementation.

#[cfg(feature = "openai-compatible")]
pub mod http;
#[cfg(feature = "openai-compatible")]
pub mod openai_compatible;

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::tools::ToolDescriptor;
use crate::types::{ChatCompletionChunk, FinishReason, GenerationSettings, Message, ToolCall, Usage};

/// Stream of canonical chunks produced by [`ProviderCompleter::stream_complete`].
pub type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk>>;

/// A request sent to a backend.
#[derive(Debug, Clone, Default, Builder)]
pub struct ProviderRequest {
    /// Backend model id; `None` lets the backend use its configured default.
    #[builder(into)]
    pub model: Option<String>,
    #[builder(default)]
    pub messages: Vec<Message>,
    /// Tools advertised to the model. Non-empty means the caller executes them.
    #[builder(default)]
    pub tools: Vec<ToolDescriptor>,
    #[builder(default)]
    pub settings: GenerationSettings,
}

impl ProviderRequest {
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// A complete (non-streamed or fully accumulated) backend response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub id: String,
    pub model: String,
    pub text: String,
    pub refusal: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

impl ProviderResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A backend able to complete chat requests in the canonical model.
///
/// Implementations translate to and from their native wire format internally.
#[async_trait]
pub trait ProviderCompleter: Send + Sync {
    /// Complete a request in one exchange.
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Complete a request as a stream of chunks.
    async fn stream_complete(&self, request: &ProviderRequest) -> Result<ChunkStream>;
}

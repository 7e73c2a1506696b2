//! Tool collaborator traits: providers that list and execute tools, and
//! observers notified around each dispatch.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::ToolDescriptor;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::types::ToolCall;

/// A source of tools discovered at runtime (a local registry, an MCP server, ...).
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// List available tools, un-namespaced.
    async fn list_tools(&self, ctx: &ExecutionContext) -> Result<Vec<ToolDescriptor>>;

    /// Execute a tool by its un-namespaced name and return the result text.
    async fn call_tool(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<String>;
}

/// Synchronous hooks around tool dispatch.
///
/// An error from either hook aborts the current turn.
pub trait ToolObserver: Send + Sync {
    fn on_call(&self, call: &ToolCall) -> Result<()>;

    fn on_result(&self, call_id: &str, name: &str, result_text: &str) -> Result<()>;
}

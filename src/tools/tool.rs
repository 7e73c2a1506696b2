//! Tool trait, closure-based tool wrapper and the local tool registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::arguments::ToolArguments;
use super::dynamic::ToolProvider;
use super::types::{ToolDescriptor, ToolParameters};
use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};

/// Core tool trait: implement to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Execute the tool with parsed arguments.
    async fn execute(&self, args: &ToolArguments, ctx: &ExecutionContext) -> Result<Value>;
}

type ToolHandler = dyn Fn(ToolArguments, ExecutionContext) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ExecutionContext) -> Result<Value> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// In-process registry of [`Tool`]s exposed as a [`ToolProvider`].
#[derive(Default, Clone)]
pub struct LocalTools {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl LocalTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration replaces an earlier one of the same name.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.by_name.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolProvider for LocalTools {
    async fn list_tools(&self, _ctx: &ExecutionContext) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<String> {
        let tool = self
            .by_name
            .get(name)
            .map(|&slot| Arc::clone(&self.tools[slot]))
            .ok_or_else(|| BridgeError::ToolNotFound(name.to_string()))?;
        let value = tool
            .execute(&ToolArguments::new(args.clone()), ctx)
            .await?;
        Ok(value_to_text(value))
    }
}

impl std::fmt::Debug for LocalTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| tool.name()))
            .finish()
    }
}

/// Tool output as the text fed back to the model. Strings pass through unquoted.
pub fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> AgentTool {
        AgentTool::new(
            "echo",
            "Echo the input back",
            ToolParameters::object().string("text", "Text to echo", true).build(),
            |args, _ctx| async move {
                Ok::<_, BridgeError>(Value::String(args.get_str("text")?.to_string()))
            },
        )
    }

    #[tokio::test]
    async fn local_tools_list_and_call() {
        let tools = LocalTools::new().with_tool(echo_tool());
        let ctx = ExecutionContext::background();

        let listed = tools.list_tools(&ctx).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "echo");

        let mut args = Map::new();
        args.insert("text".into(), json!("hello"));
        assert_eq!(tools.call_tool(&ctx, "echo", &args).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn unknown_local_tool_is_not_found() {
        let tools = LocalTools::new().with_tool(echo_tool());
        let err = tools
            .call_tool(&ExecutionContext::background(), "nope", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ToolNotFound(name) if name == "nope"));
    }

    #[test]
    fn structured_values_serialize_as_json() {
        assert_eq!(value_to_text(json!({"ok": true})), r#"{"ok":true}"#);
        assert_eq!(value_to_text(json!("plain")), "plain");
    }
}

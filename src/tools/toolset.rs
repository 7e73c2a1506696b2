//! Routing across one local tool provider and any number of namespaced remotes.
//!
//! Remote tools are exposed to the model as `<namespace>__<tool_name>`; names
//! without a known namespace prefix belong to the local provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::dynamic::ToolProvider;
use super::types::ToolDescriptor;
use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};

/// Separator between a namespace and the upstream tool name.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Where an exposed tool name is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRoute {
    /// `None` for the local provider.
    pub namespace: Option<String>,
    pub upstream_name: String,
}

/// The tool collaborators attached to a request.
#[derive(Clone, Default)]
pub struct ToolSet {
    local: Option<Arc<dyn ToolProvider>>,
    remotes: BTreeMap<String, Arc<dyn ToolProvider>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the unnamespaced local provider, replacing any previous one.
    pub fn with_local(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.local = Some(provider);
        self
    }

    /// Attach a remote provider under `namespace`.
    pub fn with_remote(
        mut self,
        namespace: impl Into<String>,
        provider: Arc<dyn ToolProvider>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains(NAMESPACE_SEPARATOR) {
            return Err(BridgeError::InvalidArgument(format!(
                "invalid tool namespace '{namespace}'"
            )));
        }
        if self.remotes.contains_key(&namespace) {
            return Err(BridgeError::InvalidArgument(format!(
                "tool namespace '{namespace}' registered twice"
            )));
        }
        self.remotes.insert(namespace, provider);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.remotes.is_empty()
    }

    /// Every tool from every collaborator, remote names prefixed with their namespace.
    pub async fn list_tools(&self, ctx: &ExecutionContext) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        if let Some(local) = &self.local {
            tools.extend(ctx.race(local.list_tools(ctx)).await?);
        }
        for (namespace, provider) in &self.remotes {
            let listed = ctx.race(provider.list_tools(ctx)).await?;
            tools.extend(listed.into_iter().map(|tool| ToolDescriptor {
                name: format!("{namespace}{NAMESPACE_SEPARATOR}{}", tool.name),
                ..tool
            }));
        }
        Ok(tools)
    }

    /// Decide which collaborator owns `name`.
    pub fn resolve(&self, name: &str) -> Result<ToolRoute> {
        if let Some((namespace, upstream)) = name.split_once(NAMESPACE_SEPARATOR) {
            if self.remotes.contains_key(namespace) && !upstream.is_empty() {
                return Ok(ToolRoute {
                    namespace: Some(namespace.to_string()),
                    upstream_name: upstream.to_string(),
                });
            }
        }
        if self.local.is_some() {
            return Ok(ToolRoute {
                namespace: None,
                upstream_name: name.to_string(),
            });
        }
        Err(BridgeError::ToolNotFound(name.to_string()))
    }

    /// Dispatch a call by its exposed name, racing the context's cancellation.
    pub async fn call(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<String> {
        let route = self.resolve(name)?;
        let provider = match &route.namespace {
            Some(namespace) => self.remotes.get(namespace),
            None => self.local.as_ref(),
        }
        .ok_or_else(|| BridgeError::ToolNotFound(name.to_string()))?;
        ctx.race(provider.call_tool(ctx, &route.upstream_name, args))
            .await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("local", &self.local.is_some())
            .field("remotes", &self.remotes.keys().collect::<Vec<_>>())
            .finish()
    }
}

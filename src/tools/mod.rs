//! Tool collaborators: providers, observers and namespaced routing.

pub mod arguments;
pub mod dynamic;
pub mod tool;
pub mod toolset;
pub mod types;

pub use arguments::ToolArguments;
pub use dynamic::{ToolObserver, ToolProvider};
pub use tool::{value_to_text, AgentTool, LocalTools, Tool};
pub use toolset::{ToolRoute, ToolSet, NAMESPACE_SEPARATOR};
pub use types::{ParameterBuilder, ToolDescriptor, ToolParameters};

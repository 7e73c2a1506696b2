//! modelbridge: one canonical chat, tool and streaming model over
//! OpenAI-compatible backends.
//!
//! The crate layers four pieces on top of a [`provider::ProviderCompleter`]:
//!
//! - [`stream`] turns chunked completions into whole responses, merging
//!   fragmented tool calls and estimating usage when the backend reports none.
//! - [`agent_loop`] runs tool rounds against a namespaced [`tools::ToolSet`]
//!   until the model stops asking for tools.
//! - [`responses`] keeps background work addressable by id with blocking
//!   retrieval, cancellation and a retention sweep.
//! - [`emulation`] speaks the Responses protocol (objects and ordered stream
//!   events) over plain streaming chat completions.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use modelbridge::prelude::*;
//! use modelbridge::provider::openai_compatible::OpenAiCompatibleProvider;
//!
//! # async fn example() -> modelbridge::Result<()> {
//! let provider = OpenAiCompatibleProvider::new("gpt-4o-mini", None, None)?;
//! let tool_loop = ToolLoop::new(Arc::new(provider));
//! let ctx = ExecutionContext::new(RequestEnv::new());
//! let request = ProviderRequest::builder()
//!     .messages(vec![Message::user("Hello!")])
//!     .build();
//! let outcome = tool_loop.run(&ctx, request).await?;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod context;
pub mod emulation;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod responses;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;

pub use error::{BridgeError, Result};

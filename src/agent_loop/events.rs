//! Events forwarded while the loop streams.

use serde::{Deserialize, Serialize};

use crate::types::Usage;

/// Progress reported by [`ToolLoop::run_streaming`](super::ToolLoop::run_streaming).
///
/// Tool activity of loop-owned tools never appears here; only calls to tools the
/// caller supplied are relayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    TextDelta {
        round: usize,
        text: String,
    },
    ToolCallDelta {
        round: usize,
        index: usize,
        /// Backend or synthesized id; stable for the call.
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments: String,
    },
    RoundCompleted {
        round: usize,
        tool_calls: usize,
        usage: Usage,
    },
}

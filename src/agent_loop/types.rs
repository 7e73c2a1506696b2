//! Outcome types for the tool loop.

use crate::provider::ProviderResponse;
use crate::types::{Conversation, Usage};

/// Result of driving one request through the tool loop.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The last round's response. Tool calls are present only when the caller
    /// supplied the tools and executes them itself.
    pub response: ProviderResponse,
    /// Usage summed over every round.
    pub usage: Usage,
    /// Number of provider rounds performed.
    pub rounds: usize,
    /// Full conversation including tool round-trips and the final assistant message.
    pub conversation: Conversation,
}

impl LoopOutcome {
    pub fn text(&self) -> &str {
        &self.response.text
    }
}

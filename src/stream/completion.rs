//! Reassembly of a complete response from streamed chunks.

use std::collections::BTreeMap;

use super::estimate::estimate_usage;
use super::tool_calls::{PartialToolCall, ToolCallAccumulator};
use crate::error::{BridgeError, Result};
use crate::provider::ProviderResponse;
use crate::types::{ChatCompletionChunk, FinishReason, Message, ToolCall, Usage};

#[derive(Debug, Default)]
struct ChoiceState {
    content: String,
    refusal: Option<String>,
    tool_calls: ToolCallAccumulator,
    finish_reason: Option<FinishReason>,
}

impl ChoiceState {
    fn gate(&self, index: usize) -> Result<()> {
        match self.finish_reason {
            Some(reason) if reason.is_complete() => Ok(()),
            Some(reason) => Err(BridgeError::NotYetAvailable(format!(
                "choice {index} finished with '{reason}'"
            ))),
            None => Err(BridgeError::NotYetAvailable(format!(
                "choice {index} has not finished"
            ))),
        }
    }
}

/// Accumulates [`ChatCompletionChunk`]s into per-choice content, refusal and tool calls.
///
/// Finalized values for a choice unlock only once it reports `stop` or `tool_calls`.
#[derive(Debug, Default)]
pub struct CompletionAccumulator {
    id: String,
    model: String,
    choices: BTreeMap<usize, ChoiceState>,
    usage: Option<Usage>,
}

impl CompletionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in. Returns any tool-call ids synthesized along the way.
    pub fn add_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<String> {
        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id.clone();
        }
        if self.model.is_empty() && !chunk.model.is_empty() {
            self.model = chunk.model.clone();
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.normalized());
        }

        let mut synthesized = Vec::new();
        for choice in &chunk.choices {
            let state = self.choices.entry(choice.index).or_default();
            if let Some(text) = &choice.delta.content {
                state.content.push_str(text);
            }
            if let Some(text) = &choice.delta.refusal {
                state.refusal.get_or_insert_with(String::new).push_str(text);
            }
            for delta in choice.delta.tool_calls.iter().flatten() {
                synthesized.extend(state.tool_calls.process_delta(delta));
            }
            if state.finish_reason.is_none() {
                state.finish_reason = choice.finish_reason;
            }
        }
        synthesized
    }

    fn choice(&self, index: usize) -> Result<&ChoiceState> {
        let state = self
            .choices
            .get(&index)
            .ok_or_else(|| BridgeError::NotYetAvailable(format!("choice {index} not started")))?;
        state.gate(index)?;
        Ok(state)
    }

    pub fn content(&self, index: usize) -> Result<&str> {
        Ok(&self.choice(index)?.content)
    }

    pub fn refusal(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.choice(index)?.refusal.as_deref())
    }

    pub fn tool_calls(&self, index: usize) -> Result<Vec<ToolCall>> {
        Ok(self.choice(index)?.tool_calls.finalize())
    }

    /// Ungated view of a call still being assembled.
    pub fn partial_tool_call(&self, choice: usize, index: usize) -> Option<PartialToolCall<'_>> {
        self.choices.get(&choice)?.tool_calls.slot(index)
    }

    pub fn finish_reason(&self, index: usize) -> Option<FinishReason> {
        self.choices.get(&index)?.finish_reason
    }

    /// Usage reported by the backend, if any.
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Build the response for choice 0, estimating usage if the backend reported none.
    pub fn into_response(self, prompt: &[Message]) -> Result<ProviderResponse> {
        let state = self.choice(0)?;
        let text = state.content.clone();
        let refusal = state.refusal.clone();
        let tool_calls = state.tool_calls.finalize();
        let finish_reason = state.finish_reason;
        let usage = self
            .usage
            .unwrap_or_else(|| estimate_usage(prompt, &text, &tool_calls));

        Ok(ProviderResponse {
            id: self.id,
            model: self.model,
            text,
            refusal,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

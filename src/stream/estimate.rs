//! Token estimation for backends that do not report usage.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{ContentPart, Message, MessageContent, ToolCall, Usage};

/// Fixed cost charged per message for role and framing.
pub const MESSAGE_OVERHEAD: u32 = 4;
/// Fixed cost charged per image part.
pub const IMAGE_FALLBACK_TOKENS: u32 = 85;

fn punctuation_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{P}\p{S}]+").expect("punctuation regex must compile"))
}

/// One unit per whitespace-delimited token plus one per punctuation run inside it.
pub fn estimate_text_tokens(text: &str) -> u32 {
    let re = punctuation_runs();
    text.split_whitespace()
        .map(|word| 1 + re.find_iter(word).count() as u32)
        .sum()
}

fn estimate_tool_calls(calls: &[ToolCall]) -> u32 {
    calls
        .iter()
        .map(|call| {
            let arguments = serde_json::Value::Object(call.function.arguments.clone()).to_string();
            estimate_text_tokens(call.name()) + estimate_text_tokens(&arguments)
        })
        .sum()
}

/// Estimated cost of one message, overhead included.
pub fn estimate_message_tokens(message: &Message) -> u32 {
    let content = match &message.content {
        MessageContent::Text(text) => estimate_text_tokens(text),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => estimate_text_tokens(text),
                ContentPart::ImageUrl { .. } => IMAGE_FALLBACK_TOKENS,
            })
            .sum(),
    };
    MESSAGE_OVERHEAD + content + estimate_tool_calls(&message.tool_calls)
}

pub fn estimate_prompt_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimated usage for a completion of `text` and `tool_calls` answering `prompt`.
/// The completion is charged as one assistant message.
pub fn estimate_usage(prompt: &[Message], text: &str, tool_calls: &[ToolCall]) -> Usage {
    let output = MESSAGE_OVERHEAD + estimate_text_tokens(text) + estimate_tool_calls(tool_calls);
    Usage::new(estimate_prompt_tokens(prompt), output)
}

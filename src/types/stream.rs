//! Streaming chunk types in the canonical chat-completions shape.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::message::Role;
use super::usage::Usage;

/// One streamed chunk of a chat completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// A single-choice chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_delta(ChunkDelta {
            content: Some(text.into()),
            ..Default::default()
        })
    }

    /// A single-choice chunk carrying one tool-call fragment.
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self::from_delta(ChunkDelta {
            tool_calls: Some(vec![delta]),
            ..Default::default()
        })
    }

    /// A single-choice chunk carrying only a finish reason.
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: Some(reason),
            }],
            ..Default::default()
        }
    }

    /// A chunk with no choices that only reports usage.
    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }

    fn from_delta(delta: ChunkDelta) -> Self {
        Self {
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            ..Default::default()
        }
    }
}

/// Per-choice portion of a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental content for one choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One fragment of a streamed tool call, addressed by its stream-local index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

impl ToolCallDelta {
    /// Opening fragment naming the function, optionally with the backend's id.
    pub fn start(index: usize, id: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: id.map(str::to_string),
            kind: Some("function".to_string()),
            function: Some(FunctionDelta {
                name: Some(name.into()),
                arguments: None,
            }),
        }
    }

    /// Continuation fragment appending to the argument JSON text.
    pub fn arguments(index: usize, fragment: impl Into<String>) -> Self {
        Self {
            index,
            id: None,
            kind: None,
            function: Some(FunctionDelta {
                name: None,
                arguments: Some(fragment.into()),
            }),
        }
    }
}

/// Function portion of a tool-call fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

//! Response objects and output items of the Responses protocol.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::responses::ResponseStatus;
use crate::types::{ToolCall, Usage};
use crate::util::ids;

/// Status of an individual output item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    InProgress,
    Completed,
    Incomplete,
}

/// A content part inside an output message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
}

impl OutputContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::OutputText {
            text: text.into(),
            annotations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub id: String,
    pub status: ItemStatus,
    pub role: String,
    pub content: Vec<OutputContent>,
}

impl OutputMessage {
    /// An assistant message with no content yet.
    pub fn started(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::InProgress,
            role: "assistant".to_string(),
            content: Vec::new(),
        }
    }

    pub fn completed(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Completed,
            content: vec![OutputContent::text(text)],
            ..Self::started(id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFunctionCall {
    pub id: String,
    pub call_id: String,
    pub name: String,
    /// Arguments as JSON text.
    pub arguments: String,
    pub status: ItemStatus,
}

impl OutputFunctionCall {
    pub fn from_call(call: &ToolCall, status: ItemStatus) -> Self {
        Self {
            id: ids::function_call_item_id(),
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: serde_json::Value::Object(call.function.arguments.clone()).to_string(),
            status,
        }
    }
}

/// One entry of a response's `output` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message(OutputMessage),
    FunctionCall(OutputFunctionCall),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

impl From<&BridgeError> for ResponseError {
    fn from(err: &BridgeError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// The full response resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseObject {
    pub id: String,
    pub object: String,
    /// Unix seconds.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub model: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ResponseObject {
    pub fn in_progress(id: impl Into<String>, model: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            object: "response".to_string(),
            created_at: created_at.timestamp(),
            completed_at: None,
            status: ResponseStatus::InProgress,
            error: None,
            model: model.into(),
            output: Vec::new(),
            usage: None,
            instructions: None,
            metadata: HashMap::new(),
        }
    }

    /// Mark completed with the given output and usage.
    pub fn complete(mut self, output: Vec<OutputItem>, usage: Usage) -> Self {
        self.status = ResponseStatus::Completed;
        self.completed_at = Some(Utc::now().timestamp());
        self.output = output;
        self.usage = Some(usage);
        self
    }

    pub fn fail(mut self, err: &BridgeError) -> Self {
        self.status = ResponseStatus::Failed;
        self.error = Some(ResponseError::from(err));
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.status = ResponseStatus::Cancelled;
        self
    }

    /// Concatenated text of every output message.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message(message) => Some(&message.content),
                OutputItem::FunctionCall(_) => None,
            })
            .flatten()
            .map(|content| match content {
                OutputContent::OutputText { text, .. } => text.as_str(),
            })
            .collect()
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &OutputFunctionCall> {
        self.output.iter().filter_map(|item| match item {
            OutputItem::FunctionCall(call) => Some(call),
            OutputItem::Message(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_items_serialize_with_type_tags() {
        let item = OutputItem::Message(OutputMessage::completed("msg_1", "hi"));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], json!("message"));
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["content"][0]["type"], json!("output_text"));
        assert_eq!(value["content"][0]["text"], json!("hi"));
    }

    #[test]
    fn failed_object_carries_error_code() {
        let object = ResponseObject::in_progress("resp_1", "m", Utc::now())
            .fail(&BridgeError::LoopExhausted { max_rounds: 20 });
        let value = serde_json::to_value(&object).unwrap();
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["error"]["code"], json!("tool_loop_exhausted"));
        assert!(value.get("usage").is_none());
    }
}

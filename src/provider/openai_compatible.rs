//! OpenAI-compatible Chat Completions backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::http::{bearer_headers, build_client, sse_chunk_stream, status_to_error};
use super::{ChunkStream, ProviderCompleter, ProviderRequest, ProviderResponse};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::types::{FinishReason, Message, MessageContent, Role, ToolCall, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Any backend speaking the Chat Completions wire format.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            model: model.into(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Build from configuration; a model id is required.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| BridgeError::Configuration("no model configured".into()))?;
        Self::new(model, config.api_key.clone(), config.base_url.clone())
    }

    pub fn model_id(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_wire).collect();
        let mut body = Map::new();
        body.insert(
            "model".into(),
            request.model.as_deref().unwrap_or(&self.model).into(),
        );
        body.insert("messages".into(), messages.into());
        body.insert("stream".into(), stream.into());
        if stream {
            body.insert("stream_options".into(), json!({ "include_usage": true }));
        }

        let settings = &request.settings;
        if let Some(max) = settings.max_tokens {
            body.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = settings.stop_sequences {
            body.insert("stop".into(), json!(stops));
        }
        if let Some(ref user) = settings.user {
            body.insert("user".into(), user.clone().into());
        }

        if !request.tools.is_empty() {
            let tool_defs: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), tool_defs.into());
        }

        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(self.endpoint())
            .headers(bearer_headers(self.api_key.as_deref()))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ProviderCompleter for OpenAiCompatibleProvider {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let body = self.build_request_body(request, false);
        debug!(model = %self.model, messages = request.messages.len(), "chat completion");

        let data: WireResponse = self.post(&body).await?.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::api(200, "No choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
            .collect();

        Ok(ProviderResponse {
            id: data.id,
            model: data.model,
            text: choice.message.content.unwrap_or_default(),
            refusal: choice.message.refusal,
            tool_calls,
            finish_reason: choice.finish_reason,
            usage: data.usage.map(Usage::normalized).unwrap_or_default(),
        })
    }

    async fn stream_complete(&self, request: &ProviderRequest) -> Result<ChunkStream> {
        let body = self.build_request_body(request, true);
        debug!(model = %self.model, messages = request.messages.len(), "streaming chat completion");
        let resp = self.post(&body).await?;
        Ok(sse_chunk_stream(resp))
    }
}

/// Parse wire argument text into a mapping. Malformed text becomes an empty mapping.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            warn!(arguments = raw, "tool call arguments are not a JSON object");
            Map::new()
        }
    }
}

/// Canonical message to wire JSON. Tool arguments travel as JSON text.
fn message_to_wire(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let content = match &message.content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Parts(parts) => json!(parts),
    };

    let mut wire = Map::new();
    wire.insert("role".into(), role.into());
    wire.insert("content".into(), content);
    if let Some(ref id) = message.tool_call_id {
        wire.insert("tool_call_id".into(), id.clone().into());
    }
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": tc.kind,
                    "function": {
                        "name": tc.function.name,
                        "arguments": Value::Object(tc.function.arguments.clone()).to_string(),
                    }
                })
            })
            .collect();
        wire.insert("tool_calls".into(), calls.into());
    }
    Value::Object(wire)
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<FinishReason>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

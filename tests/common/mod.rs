//! Shared test helpers: a scripted provider, a counting tool provider and a
//! recording observer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use modelbridge::context::ExecutionContext;
use modelbridge::error::{BridgeError, Result};
use modelbridge::provider::{ChunkStream, ProviderCompleter, ProviderRequest, ProviderResponse};
use modelbridge::tools::{ToolDescriptor, ToolObserver, ToolParameters, ToolProvider};
use modelbridge::types::*;

enum Script {
    Response(ProviderResponse),
    Chunks(Vec<Result<ChatCompletionChunk>>),
    Fail(String),
}

/// A provider that replays queued responses, in order, for both completion modes.
///
/// A queued [`ProviderResponse`] is streamed as 5-character text chunks,
/// one fragment set per tool call, a finish chunk and a usage chunk.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Script>>,
    fallback: Mutex<Option<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    chunk_delay: Mutex<Option<Duration>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a final text response.
    pub fn queue_text(&self, text: &str, usage: Usage) {
        self.push(Script::Response(text_response(text, usage)));
    }

    /// Queue a response requesting one tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: Value, usage: Usage) {
        self.push(Script::Response(tool_call_response(id, name, args, usage)));
    }

    /// Queue an arbitrary response.
    pub fn queue_response(&self, response: ProviderResponse) {
        self.push(Script::Response(response));
    }

    /// Queue raw chunks for the next streamed round.
    pub fn queue_chunks(&self, chunks: Vec<Result<ChatCompletionChunk>>) {
        self.push(Script::Chunks(chunks));
    }

    /// Queue a backend failure.
    pub fn queue_failure(&self, message: &str) {
        self.push(Script::Fail(message.to_string()));
    }

    /// Response replayed once the queue is empty.
    pub fn repeat(&self, response: ProviderResponse) {
        *self.fallback.lock().unwrap() = Some(response);
    }

    /// Sleep between streamed chunks.
    pub fn slow_chunks(&self, delay: Duration) {
        *self.chunk_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, script: Script) {
        self.script.lock().unwrap().push_back(script);
    }

    fn next_script(&self, request: &ProviderRequest) -> Script {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(script) = self.script.lock().unwrap().pop_front() {
            return script;
        }
        let fallback = self.fallback.lock().unwrap().clone();
        Script::Response(fallback.unwrap_or_else(|| text_response("Mock response", Usage::default())))
    }
}

#[async_trait]
impl ProviderCompleter for MockProvider {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        match self.next_script(request) {
            Script::Response(response) => Ok(response),
            Script::Chunks(_) => panic!("chunk script consumed by a non-streaming call"),
            Script::Fail(message) => Err(BridgeError::api(500, message)),
        }
    }

    async fn stream_complete(&self, request: &ProviderRequest) -> Result<ChunkStream> {
        let chunks = match self.next_script(request) {
            Script::Response(response) => response_chunks(&response).into_iter().map(Ok).collect(),
            Script::Chunks(chunks) => chunks,
            Script::Fail(message) => return Err(BridgeError::api(500, message)),
        };
        let delay = *self.chunk_delay.lock().unwrap();
        Ok(Box::pin(async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield chunk;
            }
        }))
    }
}

pub fn text_response(text: &str, usage: Usage) -> ProviderResponse {
    ProviderResponse {
        id: "chatcmpl-mock".to_string(),
        model: "mock-model".to_string(),
        text: text.to_string(),
        finish_reason: Some(FinishReason::Stop),
        usage,
        ..Default::default()
    }
}

pub fn tool_call_response(id: &str, name: &str, args: Value, usage: Usage) -> ProviderResponse {
    let Value::Object(arguments) = args else {
        panic!("tool arguments must be a JSON object");
    };
    ProviderResponse {
        id: "chatcmpl-mock".to_string(),
        model: "mock-model".to_string(),
        tool_calls: vec![ToolCall::new(id, name, arguments)],
        finish_reason: Some(FinishReason::ToolCalls),
        usage,
        ..Default::default()
    }
}

/// Split a response into the chunks a backend would stream for it.
pub fn response_chunks(response: &ProviderResponse) -> Vec<ChatCompletionChunk> {
    let mut chunks: Vec<ChatCompletionChunk> = response
        .text
        .chars()
        .collect::<Vec<_>>()
        .chunks(5)
        .map(|piece| ChatCompletionChunk::text(piece.iter().collect::<String>()))
        .collect();
    for (index, call) in response.tool_calls.iter().enumerate() {
        chunks.push(ChatCompletionChunk::tool_call(ToolCallDelta::start(
            index,
            Some(&call.id),
            call.name(),
        )));
        let arguments = Value::Object(call.function.arguments.clone()).to_string();
        let (head, tail) = arguments.split_at(arguments.len() / 2);
        chunks.push(ChatCompletionChunk::tool_call(ToolCallDelta::arguments(index, head)));
        chunks.push(ChatCompletionChunk::tool_call(ToolCallDelta::arguments(index, tail)));
    }
    chunks.push(ChatCompletionChunk::finish(
        response.finish_reason.unwrap_or(FinishReason::Stop),
    ));
    if !response.usage.is_empty() {
        chunks.push(ChatCompletionChunk::usage(response.usage));
    }
    for chunk in &mut chunks {
        chunk.id = response.id.clone();
        chunk.model = response.model.clone();
    }
    chunks
}

/// Tool provider exposing fixed tool names and counting executions.
pub struct CountingTools {
    names: Vec<String>,
    reply: String,
    fail_with: Option<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl CountingTools {
    pub fn new(names: &[&str], reply: &str) -> Arc<Self> {
        Arc::new(Self::build(names, reply, None))
    }

    pub fn failing(names: &[&str], message: &str) -> Arc<Self> {
        Arc::new(Self::build(names, "", Some(message.to_string())))
    }

    fn build(names: &[&str], reply: &str, fail_with: Option<String>) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
            reply: reply.to_string(),
            fail_with,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Names (as received, without namespace) and arguments of each call.
    pub fn seen(&self) -> Vec<(String, Map<String, Value>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProvider for CountingTools {
    async fn list_tools(&self, _ctx: &ExecutionContext) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .names
            .iter()
            .map(|name| ToolDescriptor::new(name.clone(), format!("{name} tool"), ToolParameters::empty()))
            .collect())
    }

    async fn call_tool(
        &self,
        _ctx: &ExecutionContext,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((name.to_string(), args.clone()));
        match &self.fail_with {
            Some(message) => Err(BridgeError::tool(name, message.clone())),
            None => Ok(self.reply.clone()),
        }
    }
}

/// Observer recording every hook invocation; optionally rejects calls.
#[derive(Default)]
pub struct RecordingObserver {
    pub reject_calls: bool,
    pub calls: Mutex<Vec<String>>,
    pub results: Mutex<Vec<(String, String)>>,
}

impl ToolObserver for RecordingObserver {
    fn on_call(&self, call: &ToolCall) -> Result<()> {
        self.calls.lock().unwrap().push(call.name().to_string());
        if self.reject_calls {
            return Err(BridgeError::Observer(format!("{} not allowed", call.name())));
        }
        Ok(())
    }

    fn on_result(&self, call_id: &str, _name: &str, result_text: &str) -> Result<()> {
        self.results
            .lock()
            .unwrap()
            .push((call_id.to_string(), result_text.to_string()));
        Ok(())
    }
}

//! Responses protocol on top of plain streaming chat completions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use super::events::ResponseEvent;
use super::object::{ItemStatus, OutputContent, OutputFunctionCall, OutputItem, OutputMessage, ResponseObject};
use crate::agent_loop::{LoopEvent, LoopOutcome, ToolLoop};
use crate::config::BridgeConfig;
use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};
use crate::provider::{ProviderCompleter, ProviderRequest};
use crate::responses::{ResponseManager, ResponseState, ResponseStatus};
use crate::tools::ToolDescriptor;
use crate::types::{GenerationSettings, Message};
use crate::util::ids;

/// Input of a Responses request: a bare prompt or a message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<Message>),
}

/// A Responses API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: ResponsesInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Caller-executed tools. When present, calls come back as `function_call` items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ResponsesRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(ResponsesInput::Text(text.into()))
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self::new(ResponsesInput::Items(messages))
    }

    fn new(input: ResponsesInput) -> Self {
        Self {
            model: None,
            input,
            instructions: None,
            tools: Vec::new(),
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    fn to_provider_request(&self) -> ProviderRequest {
        let mut messages = Vec::new();
        if let Some(instructions) = &self.instructions {
            messages.push(Message::system(instructions.clone()));
        }
        match &self.input {
            ResponsesInput::Text(text) => messages.push(Message::user(text.clone())),
            ResponsesInput::Items(items) => messages.extend(items.iter().cloned()),
        }
        ProviderRequest {
            model: self.model.clone(),
            messages,
            tools: self.tools.clone(),
            settings: GenerationSettings {
                max_tokens: self.max_output_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
                ..Default::default()
            },
        }
    }

    fn skeleton(&self, id: impl Into<String>, fallback_model: &str) -> ResponseObject {
        let mut object = ResponseObject::in_progress(
            id,
            self.model.as_deref().unwrap_or(fallback_model),
            Utc::now(),
        );
        object.instructions = self.instructions.clone();
        object.metadata = self.metadata.clone();
        object
    }
}

/// Serves Responses requests through the tool loop.
#[derive(Clone)]
pub struct ResponsesEmulator {
    tool_loop: ToolLoop,
    manager: Arc<ResponseManager<ResponseObject>>,
    default_model: String,
    event_buffer: usize,
}

impl ResponsesEmulator {
    pub fn new(tool_loop: ToolLoop, manager: Arc<ResponseManager<ResponseObject>>) -> Self {
        Self {
            tool_loop,
            manager,
            default_model: String::new(),
            event_buffer: crate::stream::DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn from_config(
        provider: Arc<dyn ProviderCompleter>,
        manager: Arc<ResponseManager<ResponseObject>>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            tool_loop: ToolLoop::from_config(provider, config),
            manager,
            default_model: config.model.clone().unwrap_or_default(),
            event_buffer: config.stream_buffer,
        }
    }

    pub fn manager(&self) -> &Arc<ResponseManager<ResponseObject>> {
        &self.manager
    }

    /// Start a streamed turn. Events arrive in protocol order; a failure ends the
    /// stream early and is reported by [`ResponseEventStream::finish`].
    pub fn stream(&self, ctx: &ExecutionContext, request: ResponsesRequest) -> ResponseEventStream {
        let turn = ctx.child();
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let driver = TurnDriver {
            tool_loop: self.tool_loop.clone(),
            events: tx,
            sequence: 0,
            buffer: self.event_buffer,
        };
        let skeleton = request.skeleton(ids::response_id(), &self.default_model);
        let guard = turn.cancellation_token().clone().drop_guard();

        tokio::spawn(async move {
            let result = driver.run(turn, request, skeleton).await;
            if let Err(err) = &result {
                debug!(error = %err, "streamed response ended early");
            }
            let _ = outcome_tx.send(result);
        });

        ResponseEventStream {
            events: rx,
            outcome: outcome_rx,
            _cancel_on_drop: guard,
        }
    }

    /// Run a turn to completion without streaming.
    pub async fn create(&self, ctx: &ExecutionContext, request: ResponsesRequest) -> Result<ResponseObject> {
        let skeleton = request.skeleton(ids::response_id(), &self.default_model);
        let outcome = self.tool_loop.run(ctx, request.to_provider_request()).await?;
        Ok(completed_object(skeleton, &outcome, outcome.response.text.clone()))
    }

    /// Register a turn with the response manager and return its in-progress snapshot.
    ///
    /// The turn keeps running after `ctx` is cancelled; use [`cancel`](Self::cancel).
    pub fn create_background(&self, ctx: &ExecutionContext, request: ResponsesRequest) -> ResponseObject {
        let tool_loop = self.tool_loop.clone();
        let fallback = self.default_model.clone();
        let work_request = request.clone();
        let state = self.manager.create(ctx, move |id, detached| async move {
            let skeleton = work_request.skeleton(id, &fallback);
            let outcome = tool_loop
                .run(&detached, work_request.to_provider_request())
                .await?;
            let text = outcome.response.text.clone();
            Ok::<_, BridgeError>(completed_object(skeleton, &outcome, text))
        });
        debug!(response_id = state.id(), "background response registered");
        let mut snapshot = request.skeleton(state.id(), &self.default_model);
        snapshot.created_at = state.created_at().timestamp();
        snapshot
    }

    /// Current snapshot without waiting.
    pub fn snapshot(&self, id: &str) -> Result<ResponseObject> {
        let state = self.manager.lookup(id)?;
        Ok(self.object_for(&state))
    }

    /// Wait for a background response to finish and return it.
    pub async fn retrieve(&self, id: &str, cancel: &CancellationToken) -> Result<ResponseObject> {
        let state = self.manager.get(id, cancel).await?;
        Ok(self.object_for(&state))
    }

    /// Cancel a background response and return its snapshot.
    pub fn cancel(&self, id: &str) -> Result<ResponseObject> {
        self.manager.cancel(id)?;
        self.snapshot(id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.manager.delete(id)
    }

    fn object_for(&self, state: &ResponseState<ResponseObject>) -> ResponseObject {
        if let Some(object) = state.result() {
            return object;
        }
        let object = ResponseObject::in_progress(state.id(), &self.default_model, state.created_at());
        match state.status() {
            ResponseStatus::Failed => match state.error() {
                Some(err) => object.fail(&err),
                None => object,
            },
            ResponseStatus::Cancelled => object.cancelled(),
            ResponseStatus::InProgress | ResponseStatus::Completed => object,
        }
    }
}

impl std::fmt::Debug for ResponsesEmulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesEmulator")
            .field("tool_loop", &self.tool_loop)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

fn completed_object(skeleton: ResponseObject, outcome: &LoopOutcome, text: String) -> ResponseObject {
    let mut output = vec![OutputItem::Message(OutputMessage::completed(ids::message_id(), text))];
    output.extend(
        outcome
            .response
            .tool_calls
            .iter()
            .map(|call| OutputItem::FunctionCall(OutputFunctionCall::from_call(call, ItemStatus::Completed))),
    );
    let mut object = skeleton.complete(output, outcome.usage);
    if !outcome.response.model.is_empty() {
        object.model = outcome.response.model.clone();
    }
    object
}

/// Emits the protocol events of one streamed turn.
struct TurnDriver {
    tool_loop: ToolLoop,
    events: mpsc::Sender<ResponseEvent>,
    sequence: u64,
    buffer: usize,
}

impl TurnDriver {
    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    async fn send(&mut self, ctx: &ExecutionContext, build: impl FnOnce(u64) -> ResponseEvent) -> Result<()> {
        let event = build(self.next_sequence());
        let events = &self.events;
        ctx.race(async { events.send(event).await.map_err(|_| BridgeError::Canceled) })
            .await
    }

    async fn relay_delta(
        &mut self,
        ctx: &ExecutionContext,
        message_id: &str,
        text: &mut String,
        delta: String,
    ) -> Result<()> {
        text.push_str(&delta);
        let item_id = message_id.to_string();
        let sent = self
            .send(ctx, |sequence_number| ResponseEvent::OutputTextDelta {
                sequence_number,
                item_id,
                output_index: 0,
                content_index: 0,
                delta,
            })
            .await;
        if sent.is_err() {
            ctx.cancel();
        }
        sent
    }

    async fn run(
        mut self,
        ctx: ExecutionContext,
        request: ResponsesRequest,
        skeleton: ResponseObject,
    ) -> Result<ResponseObject> {
        let message_id = ids::message_id();

        let created = skeleton.clone();
        self.send(&ctx, |sequence_number| ResponseEvent::Created {
            sequence_number,
            response: created,
        })
        .await?;
        let in_progress = skeleton.clone();
        self.send(&ctx, |sequence_number| ResponseEvent::InProgress {
            sequence_number,
            response: in_progress,
        })
        .await?;
        self.send(&ctx, |sequence_number| ResponseEvent::OutputItemAdded {
            sequence_number,
            output_index: 0,
            item: OutputItem::Message(OutputMessage::started(message_id.clone())),
        })
        .await?;
        self.send(&ctx, |sequence_number| ResponseEvent::ContentPartAdded {
            sequence_number,
            item_id: message_id.clone(),
            output_index: 0,
            content_index: 0,
            part: OutputContent::text(""),
        })
        .await?;

        // Only a single-round turn can stream text live. Otherwise each round's
        // text is held until the round ends, and a round that called tools is dropped.
        let live = !request.tools.is_empty() || ctx.tools().is_empty();
        let (loop_tx, mut loop_rx) = mpsc::channel(self.buffer);
        let tool_loop = self.tool_loop.clone();
        let run = tool_loop.run_streaming(&ctx, request.to_provider_request(), loop_tx);

        let relay = async {
            let mut text = String::new();
            let mut held: Vec<String> = Vec::new();
            let mut parked: Vec<String> = Vec::new();
            while let Some(event) = loop_rx.recv().await {
                match event {
                    LoopEvent::TextDelta { text: delta, .. } if live => {
                        self.relay_delta(&ctx, &message_id, &mut text, delta).await?;
                    }
                    LoopEvent::TextDelta { text: delta, .. } => held.push(delta),
                    LoopEvent::RoundCompleted { round, tool_calls, .. } => {
                        debug!(round, tool_calls, "responses stream: round completed");
                        if tool_calls > 0 {
                            parked = std::mem::take(&mut held);
                            continue;
                        }
                        parked.clear();
                        for delta in held.drain(..) {
                            self.relay_delta(&ctx, &message_id, &mut text, delta).await?;
                        }
                    }
                    LoopEvent::ToolCallDelta { .. } => {}
                }
            }
            Ok::<_, BridgeError>((text, parked))
        };

        let (outcome, relayed) = tokio::join!(run, relay);
        let outcome = outcome?;
        let (mut text, parked) = relayed?;
        // A final round can still carry calls when no tool was listed for it.
        if !live && outcome.response.has_tool_calls() {
            for delta in parked {
                self.relay_delta(&ctx, &message_id, &mut text, delta).await?;
            }
        }

        self.send(&ctx, |sequence_number| ResponseEvent::OutputTextDone {
            sequence_number,
            item_id: message_id.clone(),
            output_index: 0,
            content_index: 0,
            text: text.clone(),
        })
        .await?;
        self.send(&ctx, |sequence_number| ResponseEvent::ContentPartDone {
            sequence_number,
            item_id: message_id.clone(),
            output_index: 0,
            content_index: 0,
            part: OutputContent::text(text.clone()),
        })
        .await?;
        let message = OutputItem::Message(OutputMessage::completed(message_id.clone(), text.clone()));
        let done = message.clone();
        self.send(&ctx, |sequence_number| ResponseEvent::OutputItemDone {
            sequence_number,
            output_index: 0,
            item: done,
        })
        .await?;

        let mut output = vec![message];
        for (offset, call) in outcome.response.tool_calls.iter().enumerate() {
            let output_index = offset as u32 + 1;
            let started = OutputFunctionCall::from_call(call, ItemStatus::InProgress);
            let finished = OutputFunctionCall {
                status: ItemStatus::Completed,
                ..started.clone()
            };
            self.send(&ctx, |sequence_number| ResponseEvent::OutputItemAdded {
                sequence_number,
                output_index,
                item: OutputItem::FunctionCall(started.clone()),
            })
            .await?;
            self.send(&ctx, |sequence_number| ResponseEvent::FunctionCallArgumentsDone {
                sequence_number,
                item_id: started.id.clone(),
                output_index,
                arguments: started.arguments.clone(),
            })
            .await?;
            let done = OutputItem::FunctionCall(finished);
            output.push(done.clone());
            self.send(&ctx, |sequence_number| ResponseEvent::OutputItemDone {
                sequence_number,
                output_index,
                item: done,
            })
            .await?;
        }

        let mut response = skeleton.complete(output, outcome.usage);
        if !outcome.response.model.is_empty() {
            response.model = outcome.response.model.clone();
        }
        let completed = response.clone();
        self.send(&ctx, |sequence_number| ResponseEvent::Completed {
            sequence_number,
            response: completed,
        })
        .await?;
        Ok(response)
    }
}

/// Consumer side of a streamed turn. Dropping it cancels the turn.
pub struct ResponseEventStream {
    events: mpsc::Receiver<ResponseEvent>,
    outcome: oneshot::Receiver<Result<ResponseObject>>,
    _cancel_on_drop: DropGuard,
}

impl ResponseEventStream {
    /// Next event, or `None` once the turn has ended (successfully or not).
    pub async fn next(&mut self) -> Option<ResponseEvent> {
        self.events.recv().await
    }

    /// Discard remaining events and return the turn's outcome.
    pub async fn finish(mut self) -> Result<ResponseObject> {
        while self.events.recv().await.is_some() {}
        match (&mut self.outcome).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Stream("response task ended without an outcome".into())),
        }
    }

    /// Events as a stream; a failed turn ends with one `Err` item.
    pub fn into_stream(self) -> BoxStream<'static, Result<ResponseEvent>> {
        Box::pin(async_stream::stream! {
            let mut this = self;
            while let Some(event) = this.next().await {
                yield Ok(event);
            }
            if let Err(err) = this.finish().await {
                yield Err(err);
            }
        })
    }
}

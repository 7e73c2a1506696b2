//! Bounded multi-round tool loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};
use crate::provider::{ProviderCompleter, ProviderRequest, ProviderResponse};
use crate::stream::{CompletionAccumulator, StreamPump, DEFAULT_STREAM_BUFFER};
use crate::types::{Conversation, Message, ToolCall, Usage};

use super::events::LoopEvent;
use super::types::LoopOutcome;

/// Maximum tool loop rounds unless configured otherwise.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

/// Drives one request through as many provider rounds as tool use requires.
///
/// When the request already carries tools, the caller owns their execution and
/// the loop performs exactly one round. Otherwise the tools attached to the
/// execution context are advertised and executed here, up to `max_rounds`.
#[derive(Clone)]
pub struct ToolLoop {
    provider: Arc<dyn ProviderCompleter>,
    max_rounds: usize,
    stop_on_tool_error: bool,
    stream_buffer: usize,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn ProviderCompleter>) -> Self {
        Self {
            provider,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            stop_on_tool_error: false,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn from_config(provider: Arc<dyn ProviderCompleter>, config: &BridgeConfig) -> Self {
        Self {
            provider,
            max_rounds: config.max_tool_rounds,
            stop_on_tool_error: config.stop_on_tool_error,
            stream_buffer: config.stream_buffer,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_stop_on_tool_error(mut self, stop: bool) -> Self {
        self.stop_on_tool_error = stop;
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Run with one non-streaming completion per round.
    pub async fn run(&self, ctx: &ExecutionContext, request: ProviderRequest) -> Result<LoopOutcome> {
        self.drive(ctx, request, None).await
    }

    /// Run with one streamed completion per round, relaying progress on `events`.
    pub async fn run_streaming(
        &self,
        ctx: &ExecutionContext,
        request: ProviderRequest,
        events: mpsc::Sender<LoopEvent>,
    ) -> Result<LoopOutcome> {
        self.drive(ctx, request, Some(&events)).await
    }

    async fn drive(
        &self,
        ctx: &ExecutionContext,
        mut request: ProviderRequest,
        events: Option<&mpsc::Sender<LoopEvent>>,
    ) -> Result<LoopOutcome> {
        let caller_tools = request.has_tools();
        let mut conversation = Conversation::new(std::mem::take(&mut request.messages))?;

        if !caller_tools {
            request.tools = ctx.tools().list_tools(ctx).await?;
        }
        let loop_owns_tools = !caller_tools && !request.tools.is_empty();
        let rounds = if loop_owns_tools { self.max_rounds } else { 1 };
        let mut usage = Usage::default();

        for round in 1..=rounds {
            request.messages = conversation.messages().to_vec();
            debug!(round, messages = request.messages.len(), "tool loop: calling provider");

            let response = match events {
                Some(events) => self.stream_round(ctx, &request, events, caller_tools, round).await?,
                None => ctx.race(self.provider.complete(&request)).await?,
            };
            usage.merge(&response.usage);

            if let Some(events) = events {
                emit(
                    ctx,
                    events,
                    LoopEvent::RoundCompleted {
                        round,
                        tool_calls: response.tool_calls.len(),
                        usage: response.usage,
                    },
                )
                .await?;
            }

            if !loop_owns_tools || !response.has_tool_calls() {
                conversation.push(Message::assistant_tool_calls(
                    response.text.clone(),
                    response.tool_calls.clone(),
                ))?;
                debug!(round, total_tokens = usage.total_tokens, "tool loop: finished");
                return Ok(LoopOutcome {
                    response,
                    usage,
                    rounds: round,
                    conversation,
                });
            }

            debug!(round, tool_calls = response.tool_calls.len(), "tool loop: executing tools");
            conversation.push(Message::assistant_tool_calls(
                response.text.clone(),
                response.tool_calls.clone(),
            ))?;
            for call in &response.tool_calls {
                let text = self.dispatch(ctx, call).await?;
                conversation.push(Message::tool_result(call.id.clone(), text))?;
            }
        }

        Err(BridgeError::LoopExhausted {
            max_rounds: self.max_rounds,
        })
    }

    async fn dispatch(&self, ctx: &ExecutionContext, call: &ToolCall) -> Result<String> {
        if let Some(observer) = ctx.observer() {
            observer.on_call(call).map_err(into_observer_error)?;
        }

        let text = match ctx
            .tools()
            .call(ctx, call.name(), &call.function.arguments)
            .await
        {
            Ok(text) => text,
            Err(
                e @ (BridgeError::ToolNotFound(_)
                | BridgeError::Canceled
                | BridgeError::DeadlineExceeded),
            ) => return Err(e),
            Err(e) if self.stop_on_tool_error => {
                return Err(BridgeError::tool(call.name(), e.to_string()));
            }
            Err(e) => {
                warn!(tool = call.name(), call_id = %call.id, error = %e, "tool execution failed");
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };

        if let Some(observer) = ctx.observer() {
            observer
                .on_result(&call.id, call.name(), &text)
                .map_err(into_observer_error)?;
        }
        Ok(text)
    }

    async fn stream_round(
        &self,
        ctx: &ExecutionContext,
        request: &ProviderRequest,
        events: &mpsc::Sender<LoopEvent>,
        forward_tool_calls: bool,
        round: usize,
    ) -> Result<ProviderResponse> {
        let stream = ctx.race(self.provider.stream_complete(request)).await?;
        let mut chunks = StreamPump::spawn(ctx, stream, self.stream_buffer);
        let mut accumulator = CompletionAccumulator::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            accumulator.add_chunk(&chunk);

            for choice in chunk.choices.iter().filter(|choice| choice.index == 0) {
                if let Some(text) = choice.delta.content.as_deref().filter(|t| !t.is_empty()) {
                    let event = LoopEvent::TextDelta {
                        round,
                        text: text.to_string(),
                    };
                    emit(ctx, events, event).await?;
                }
                if !forward_tool_calls {
                    continue;
                }
                for delta in choice.delta.tool_calls.iter().flatten() {
                    let Some(call_id) = accumulator
                        .partial_tool_call(0, delta.index)
                        .and_then(|partial| partial.id)
                        .map(str::to_string)
                    else {
                        continue;
                    };
                    let function = delta.function.as_ref();
                    let event = LoopEvent::ToolCallDelta {
                        round,
                        index: delta.index,
                        call_id,
                        name: function.and_then(|f| f.name.clone()),
                        arguments: function
                            .and_then(|f| f.arguments.clone())
                            .unwrap_or_default(),
                    };
                    emit(ctx, events, event).await?;
                }
            }
        }

        accumulator.into_response(&request.messages)
    }
}

async fn emit(
    ctx: &ExecutionContext,
    events: &mpsc::Sender<LoopEvent>,
    event: LoopEvent,
) -> Result<()> {
    ctx.race(async {
        events
            .send(event)
            .await
            .map_err(|_| BridgeError::Canceled)
    })
    .await
}

fn into_observer_error(err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Observer(_) => err,
        other => BridgeError::Observer(other.to_string()),
    }
}

impl std::fmt::Debug for ToolLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolLoop")
            .field("max_rounds", &self.max_rounds)
            .field("stop_on_tool_error", &self.stop_on_tool_error)
            .field("stream_buffer", &self.stream_buffer)
            .finish()
    }
}

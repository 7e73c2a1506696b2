#![cfg(feature = "openai-compatible")]

mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelbridge::agent_loop::ToolLoop;
use modelbridge::context::{ExecutionContext, RequestEnv};
use modelbridge::error::BridgeError;
use modelbridge::provider::openai_compatible::OpenAiCompatibleProvider;
use modelbridge::provider::{ProviderCompleter, ProviderRequest};
use modelbridge::stream::CompletionAccumulator;
use modelbridge::tools::ToolSet;
use modelbridge::types::{FinishReason, Message, Usage};

fn provider(server: &MockServer) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new("test-model", Some("test-key".into()), Some(server.uri())).unwrap()
}

fn ask(text: &str) -> ProviderRequest {
    ProviderRequest::builder()
        .messages(vec![Message::user(text)])
        .build()
}

fn sse(events: &[serde_json::Value]) -> String {
    let mut body: String = events.iter().map(|event| format!("data: {event}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn complete_parses_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "test-model", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server).complete(&ask("hi")).await.unwrap();

    assert_eq!(response.text, "Hello!");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage, Usage::new(7, 2));
    assert_eq!(response.id, "chatcmpl-1");
}

#[tokio::test]
async fn complete_parses_tool_call_argument_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"q\":\"rust\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let response = provider(&server).complete(&ask("hi")).await.unwrap();

    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_abc");
    assert_eq!(response.tool_calls[0].function.arguments["q"], json!("rust"));
    assert_eq!(response.text, "");
}

#[tokio::test]
async fn error_status_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "unknown model"}})),
        )
        .mount(&server)
        .await;

    let err = provider(&server).complete(&ask("hi")).await.unwrap_err();

    assert!(matches!(err, BridgeError::Api { status: 400, ref message } if message == "unknown model"));
}

#[tokio::test]
async fn rate_limit_status_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(
            json!({"error": {"message": "slow down", "retry_after": 2}}),
        ))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&ask("hi")).await.unwrap_err();

    assert!(matches!(err, BridgeError::RateLimited { retry_after_ms: Some(2000) }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn streamed_tool_call_fragments_are_merged() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"id": "c1", "model": "test-model", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Let me "}}]}),
        json!({"id": "c1", "choices": [{"index": 0, "delta": {"content": "check."}}]}),
        json!({"id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "type": "function", "function": {"name": "search", "arguments": ""}}
        ]}}]}),
        json!({"id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "{\"q\":"}}
        ]}}]}),
        json!({"id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "\"tokio\"}"}}
        ]}}]}),
        json!({"id": "c1", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        json!({"id": "c1", "choices": [], "usage": {"prompt_tokens": 11, "completion_tokens": 6, "total_tokens": 17}}),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true, "stream_options": {"include_usage": true}})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let request = ask("check tokio");
    let mut stream = provider(&server).stream_complete(&request).await.unwrap();
    let mut accumulator = CompletionAccumulator::new();
    while let Some(chunk) = stream.next().await {
        accumulator.add_chunk(&chunk.unwrap());
    }
    let response = accumulator.into_response(&request.messages).unwrap();

    assert_eq!(response.text, "Let me check.");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_1");
    assert_eq!(response.tool_calls[0].function.arguments["q"], json!("tokio"));
    assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(response.usage, Usage::new(11, 6));
}

#[tokio::test]
async fn in_band_stream_error_surfaces() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices": [{"index": 0, "delta": {"content": "par"}}]}),
        json!({"error": {"message": "overloaded"}}),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let chunks: Vec<_> = provider(&server)
        .stream_complete(&ask("hi"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].is_ok());
    assert!(matches!(&chunks[1], Err(BridgeError::Stream(message)) if message == "overloaded"));
}

#[tokio::test]
async fn tool_loop_runs_against_a_live_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "search", "arguments": "{}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "all done"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2}
        })))
        .mount(&server)
        .await;

    let tools = common::CountingTools::new(&["search"], "nothing found");
    let ctx = ExecutionContext::new(RequestEnv::new().with_tools(ToolSet::new().with_local(tools.clone())));

    let outcome = ToolLoop::new(Arc::new(provider(&server)))
        .run(&ctx, ask("go"))
        .await
        .unwrap();

    assert_eq!(outcome.text(), "all done");
    assert_eq!(outcome.usage, Usage::new(14, 5));
    assert_eq!(tools.calls(), 1);
}

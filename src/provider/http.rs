//! HTTP client construction, SSE parsing, and status mapping.

use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use super::ChunkStream;
use crate::error::{BridgeError, Result};
use crate::types::ChatCompletionChunk;

/// Build a pooled client with an overall request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()?)
}

/// Build default headers for a Bearer-token API. A missing key sends no auth header.
pub fn bearer_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> BridgeError {
    match status {
        429 => BridgeError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => BridgeError::api(status, error_message(body)),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Turn a streaming response body into canonical chunks.
///
/// The stream ends at `[DONE]` or when the body closes. An in-band error object
/// ends the stream with a stream error.
pub fn sse_chunk_stream(response: reqwest::Response) -> ChunkStream {
    sse_chunks(response.bytes_stream())
}

fn sse_chunks<S, B>(byte_stream: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(byte_stream);

        'outer: while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(BridgeError::Network(e));
                    break;
                }
            };

            // Decode whole lines only; a chunk may end inside a UTF-8 sequence.
            buffer.extend_from_slice(bytes.as_ref());

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();

                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                if line == "data: [DONE]" || line == "data:[DONE]" {
                    break 'outer;
                }
                let Some(data) = parse_sse_data(&line) else {
                    continue;
                };
                match decode_chunk(data) {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => {
                        yield Err(e);
                        break 'outer;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

fn decode_chunk(data: &str) -> Result<ChatCompletionChunk> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        return Err(BridgeError::Stream(envelope.error.message));
    }
    let mut chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    if let Some(usage) = chunk.usage.as_mut() {
        *usage = usage.normalized();
    }
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_lines() {
        assert_eq!(parse_sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(parse_sse_data("data:{}"), Some("{}"));
        assert_eq!(parse_sse_data("data: [DONE]"), None);
        assert_eq!(parse_sse_data("event: ping"), None);
    }

    #[test]
    fn rate_limit_status_carries_retry_after() {
        let err = status_to_error(429, r#"{"error":{"message":"slow","retry_after":1.5}}"#);
        assert!(matches!(
            err,
            BridgeError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
    }

    #[test]
    fn api_errors_unwrap_message_envelope() {
        let err = status_to_error(400, r#"{"error":{"message":"bad model"}}"#);
        assert!(matches!(err, BridgeError::Api { status: 400, ref message } if message == "bad model"));
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_survives() {
        let line = "data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n\ndata: [DONE]\n\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let pieces: Vec<reqwest::Result<Vec<u8>>> =
            vec![Ok(line[..split].to_vec()), Ok(line[split..].to_vec())];

        let chunks: Vec<_> = sse_chunks(futures::stream::iter(pieces)).collect().await;

        assert_eq!(chunks.len(), 1);
        let chunk = chunks.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("caf\u{e9}"));
    }

    #[test]
    fn in_band_error_object_is_a_stream_error() {
        let err = decode_chunk(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Stream(message) if message == "overloaded"));
    }
}

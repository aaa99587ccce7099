//! Client for the upstream OpenAI-compatible chat-completions API.
//!
//! Streaming responses are decoded frame-by-frame off the response body and
//! handed to consumers over an mpsc channel; non-streaming generation reads
//! the whole body and extracts the first choice.

use futures::{StreamExt, TryStreamExt};
use hyper::{body::to_bytes, Body as HyperBody, Client, Request};
use hyper_tls::HttpsConnector;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::ApiError;

// Matches the platform's per-request bound; generation past this is cut off.
const REQUEST_TIMEOUT_SECS: u64 = 30;
const STREAM_CHUNK_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// A chunk from the completion stream.
#[derive(Clone, Debug)]
pub enum CompletionChunk {
    /// Parsed JSON frame from upstream (delta, tool-call fragment, usage).
    Chunk(Value),
    /// Stream finished.
    Done,
    /// Stream error occurred.
    Error(String),
}

fn https_client() -> Client<HttpsConnector<hyper::client::HttpConnector>, HyperBody> {
    let https = HttpsConnector::new();
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .build::<_, HyperBody>(https)
}

async fn send_chat_request(
    config: &LlmConfig,
    body_json: String,
) -> Result<hyper::Response<HyperBody>, String> {
    let client = https_client();

    let mut req = Request::builder()
        .method("POST")
        .uri(format!("{}/v1/chat/completions", config.base_url))
        .header("Content-Type", "application/json");

    if let Some(api_key) = &config.api_key {
        if !api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
    }

    let req = req
        .body(HyperBody::from(body_json))
        .map_err(|e| format!("Failed to create request body: {:?}", e))?;

    match timeout(
        Duration::from_secs(REQUEST_TIMEOUT_SECS),
        client.request(req),
    )
    .await
    {
        Ok(Ok(response)) => {
            if response.status().is_success() {
                Ok(response)
            } else {
                let status = response.status();
                if let Ok(body_bytes) = to_bytes(response.into_body()).await {
                    let body_str = String::from_utf8_lossy(&body_bytes);
                    error!("Upstream returned status {}: {}", status, body_str);
                    Err(format!("Upstream returned status {}: {}", status, body_str))
                } else {
                    Err(format!("Upstream returned status {}", status))
                }
            }
        }
        Ok(Err(e)) => {
            error!("Failed to send request to upstream: {:?}", e);
            Err(format!("Failed to connect to upstream: {}", e))
        }
        Err(_) => {
            error!("Upstream request timed out after {}s", REQUEST_TIMEOUT_SECS);
            Err("Upstream request timed out".to_string())
        }
    }
}

/// Issue a streaming chat-completion request. The returned receiver yields
/// parsed SSE frames until `Done` or a terminal `Error`. The decode task
/// stops early if the receiver is dropped.
pub async fn chat_completion_stream(
    config: &LlmConfig,
    body: Value,
) -> Result<mpsc::Receiver<CompletionChunk>, ApiError> {
    let body_json = serde_json::to_string(&body).map_err(|e| {
        error!("Failed to serialize completion request: {:?}", e);
        ApiError::InternalServerError
    })?;

    debug!("Sending streaming completion request for model {}", config.model);

    let res = send_chat_request(config, body_json).await.map_err(|e| {
        error!("Chat completion request failed: {}", e);
        ApiError::UpstreamError
    })?;

    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut body_stream = res.into_body().into_stream();
        let mut buffer = String::new();

        loop {
            match timeout(
                Duration::from_secs(STREAM_CHUNK_TIMEOUT_SECS),
                body_stream.next(),
            )
            .await
            {
                Ok(Some(Ok(bytes))) => {
                    buffer.push_str(&String::from_utf8_lossy(bytes.as_ref()));

                    while let Some(frame) = extract_sse_frame(&mut buffer) {
                        if frame == "[DONE]" {
                            let _ = tx.send(CompletionChunk::Done).await;
                            return;
                        }

                        match serde_json::from_str::<Value>(&frame) {
                            Ok(json) => {
                                if tx.send(CompletionChunk::Chunk(json)).await.is_err() {
                                    // Receiver dropped, stop decoding.
                                    return;
                                }
                            }
                            Err(e) => {
                                error!("Received non-JSON data event. Error: {:?}", e);
                                let _ = tx
                                    .send(CompletionChunk::Error(
                                        "Invalid JSON from upstream".to_string(),
                                    ))
                                    .await;
                                return;
                            }
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    error!("Stream error: {:?}", e);
                    let _ = tx.send(CompletionChunk::Error(e.to_string())).await;
                    return;
                }
                Ok(None) => {
                    // Stream ended without explicit [DONE]
                    let _ = tx.send(CompletionChunk::Done).await;
                    return;
                }
                Err(_) => {
                    error!(
                        "Upstream stream stalled for {}s, giving up",
                        STREAM_CHUNK_TIMEOUT_SECS
                    );
                    let _ = tx
                        .send(CompletionChunk::Error("Upstream stream timed out".to_string()))
                        .await;
                    return;
                }
            }
        }
    });

    Ok(rx)
}

/// One-shot, non-streaming generation; returns the first choice's text.
pub async fn generate_text(
    config: &LlmConfig,
    system: &str,
    prompt: &str,
) -> Result<String, ApiError> {
    let body = json!({
        "model": config.model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": prompt},
        ],
        "stream": false,
    });

    let body_json = serde_json::to_string(&body).map_err(|e| {
        error!("Failed to serialize generation request: {:?}", e);
        ApiError::InternalServerError
    })?;

    let res = send_chat_request(config, body_json).await.map_err(|e| {
        error!("Generation request failed: {}", e);
        ApiError::UpstreamError
    })?;

    let body_bytes = to_bytes(res.into_body()).await.map_err(|e| {
        error!("Failed to read generation response body: {:?}", e);
        ApiError::UpstreamError
    })?;

    let response_json: Value = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!("Failed to parse generation response JSON: {:?}", e);
        ApiError::UpstreamError
    })?;

    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            error!("Generation response missing message content");
            ApiError::UpstreamError
        })
}

/// Extract the data portion of the next complete "data: ..." frame from the
/// buffer, skipping keep-alive comments and empty frames.
pub fn extract_sse_frame(buffer: &mut String) -> Option<String> {
    loop {
        if let Some(pos) = buffer.find("\n\n") {
            let frame = buffer[..pos].to_string();
            *buffer = buffer[pos + 2..].to_string();

            if frame.trim().is_empty() {
                continue;
            }

            if let Some(data) = frame.strip_prefix("data: ") {
                return Some(data.to_string());
            }
            // Non-data frame (comment etc.), keep looking.
            continue;
        }

        return None;
    }
}

/// True once a streaming chunk carries a non-null finish_reason.
pub fn finish_reason(json: &Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("finish_reason"))
        .and_then(|r| r.as_str())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_extraction_waits_for_complete_frame() {
        let mut buf = String::from("data: {\"a\":1}");
        assert_eq!(extract_sse_frame(&mut buf), None);

        buf.push_str("\n\ndata: [DONE]\n\n");
        assert_eq!(extract_sse_frame(&mut buf), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_sse_frame(&mut buf), Some("[DONE]".to_string()));
        assert_eq!(extract_sse_frame(&mut buf), None);
    }

    #[test]
    fn frame_extraction_skips_keepalives() {
        let mut buf = String::from(": keep-alive\n\n\n\ndata: {\"b\":2}\n\n");
        assert_eq!(extract_sse_frame(&mut buf), Some("{\"b\":2}".to_string()));
    }

    #[test]
    fn finish_reason_absent_until_final_chunk() {
        let chunk: Value =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#)
                .unwrap();
        assert_eq!(finish_reason(&chunk), None);

        let last: Value =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert_eq!(finish_reason(&last), Some("stop".to_string()));
    }
}

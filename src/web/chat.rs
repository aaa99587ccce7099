//! The streaming chat route.
//!
//! One pass per request: validate, hydrate the transcript, load the
//! organization context, then drive generation against the upstream model
//! while streaming deltas to the caller. Persistence runs in a dedicated
//! storage task fed by its own channel, so it completes even if the client
//! disconnects, and its outcome lands on the stream bookkeeping row.

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context_builder::{build_chat_messages, build_system_prompt};
use crate::llm::{self, CompletionChunk};
use crate::models::chats::NewChat;
use crate::models::messages::{NewMessage, ROLE_ASSISTANT};
use crate::models::streams::{NewStream, StreamStatus};
use crate::web::auth::{require_user, AuthUser};
use crate::web::tools::ToolRegistry;
use crate::{ApiError, AppState, DBConnection};

/// Cap on model/tool round-trips within one request.
const MAX_TOOL_STEPS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub role: String,
    pub content: String,
}

/// Both client variants: a single new message, or the full transcript with
/// the new message last.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub messages: Option<Vec<IncomingMessage>>,
}

/// Events flowing from the generation task to the SSE stream and the
/// storage task.
#[derive(Clone, Debug)]
enum GenEvent {
    TextDelta(String),
    ToolResult { name: String, result_json: String },
    Finish { reason: String },
    Error(String),
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let chat_id = body.id.ok_or(ApiError::MissingChatFields)?;

    let message = match (body.message, body.messages) {
        (Some(m), _) => m,
        (None, Some(mut transcript)) => transcript.pop().ok_or(ApiError::MissingChatFields)?,
        (None, None) => return Err(ApiError::MissingChatFields),
    };
    if message.content.trim().is_empty() {
        return Err(ApiError::MissingChatFields);
    }

    debug!("Chat request for chat {} from user {}", chat_id, user.id);

    // Chats come into existence on the first user message. A chat id owned
    // by another user resolves to NotFound here.
    let chat = state.db.get_or_create_chat(NewChat {
        id: chat_id,
        user_id: user.id,
        title: None,
    })?;

    let history = state.db.load_chat_messages(chat.id)?;

    let organization = state
        .db
        .get_organization_for_user(user.id)?
        .ok_or(ApiError::OrganizationDataRequired)?;

    let system_prompt = build_system_prompt(&organization.data_json);

    let client_message_id = message.id.unwrap_or_else(Uuid::new_v4);
    let transcript = build_chat_messages(
        &history,
        client_message_id,
        &message.role,
        &message.content,
    );

    let stream_id = Uuid::new_v4();
    state
        .db
        .create_stream(NewStream::active(stream_id, chat.id))?;

    let registry = ToolRegistry::for_user(state.clone(), user.id);

    // The first upstream call happens before the response is committed, so
    // a dead provider is a synchronous 500 instead of a broken stream.
    let first_rx = match llm::chat_completion_stream(
        &state.llm,
        completion_request(&state, &registry, &system_prompt, &transcript),
    )
    .await
    {
        Ok(rx) => rx,
        Err(e) => {
            if let Err(se) = state.db.update_stream_status(stream_id, StreamStatus::Error) {
                error!("Failed to mark stream {} as errored: {:?}", stream_id, se);
            }
            return Err(e);
        }
    };

    let (tx_client, mut rx_client) = mpsc::channel::<GenEvent>(256);
    let (tx_storage, rx_storage) = mpsc::channel::<GenEvent>(256);

    // The user message persists together with the assistant reply once
    // generation finishes, exactly like the rest of the transcript.
    let user_row = NewMessage {
        id: client_message_id,
        chat_id: chat.id,
        role: message.role.clone(),
        content: message.content.clone(),
        meta_json: None,
        created_at: Utc::now(),
    };

    {
        let db = state.db.clone();
        tokio::spawn(storage_task(rx_storage, db, chat.id, stream_id, user_row));
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            run_generation(
                state,
                registry,
                system_prompt,
                transcript,
                first_rx,
                tx_client,
                tx_storage,
            )
            .await;
        });
    }

    let event_stream = async_stream::stream! {
        while let Some(ev) = rx_client.recv().await {
            match ev {
                GenEvent::TextDelta(delta) => {
                    yield Ok::<Event, Infallible>(Event::default().data(
                        json!({"type": "text-delta", "delta": delta}).to_string(),
                    ));
                }
                GenEvent::ToolResult { name, result_json } => {
                    let result: Value = serde_json::from_str(&result_json)
                        .unwrap_or(Value::String(result_json));
                    yield Ok(Event::default().data(
                        json!({"type": "tool-result", "tool": name, "result": result}).to_string(),
                    ));
                }
                GenEvent::Finish { reason } => {
                    yield Ok(Event::default().data(
                        json!({"type": "finish", "reason": reason}).to_string(),
                    ));
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
                GenEvent::Error(message) => {
                    yield Ok(Event::default().data(
                        json!({"type": "error", "message": message}).to_string(),
                    ));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(event_stream).into_response())
}

/// Partially assembled tool call, built up from streamed fragments.
#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct PendingToolCalls {
    calls: Vec<PendingToolCall>,
}

impl PendingToolCalls {
    fn absorb(&mut self, deltas: &[Value]) {
        for delta in deltas {
            let index = delta
                .get("index")
                .and_then(|i| i.as_u64())
                .unwrap_or(self.calls.len() as u64) as usize;

            if self.calls.len() <= index {
                self.calls.resize(index + 1, PendingToolCall::default());
            }
            let call = &mut self.calls[index];

            if let Some(id) = delta.get("id").and_then(|v| v.as_str()) {
                call.id = id.to_string();
            }
            if let Some(name) = delta["function"]["name"].as_str() {
                call.name.push_str(name);
            }
            if let Some(arguments) = delta["function"]["arguments"].as_str() {
                call.arguments.push_str(arguments);
            }
        }
    }

    fn into_calls(self) -> Vec<PendingToolCall> {
        self.calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .collect()
    }
}

fn completion_request(
    state: &Arc<AppState>,
    registry: &ToolRegistry,
    system_prompt: &str,
    transcript: &[Value],
) -> Value {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(json!({"role": "system", "content": system_prompt}));
    messages.extend(transcript.iter().cloned());

    json!({
        "model": state.llm.model,
        "messages": messages,
        "tools": registry.to_openai_spec(),
        "tool_choice": "auto",
        "stream": true,
    })
}

async fn run_generation(
    state: Arc<AppState>,
    registry: ToolRegistry,
    system_prompt: String,
    mut transcript: Vec<Value>,
    first_rx: mpsc::Receiver<CompletionChunk>,
    tx_client: mpsc::Sender<GenEvent>,
    tx_storage: mpsc::Sender<GenEvent>,
) {
    // Sends to the client are best-effort: a dropped connection must not
    // stop generation or the save.
    let emit = |ev: GenEvent| {
        let tx_client = tx_client.clone();
        let tx_storage = tx_storage.clone();
        async move {
            let _ = tx_storage.send(ev.clone()).await;
            let _ = tx_client.send(ev).await;
        }
    };

    let mut next_rx = Some(first_rx);
    let mut step = 0;
    loop {
        let mut rx = match next_rx.take() {
            Some(rx) => rx,
            None => {
                let request_body =
                    completion_request(&state, &registry, &system_prompt, &transcript);
                match llm::chat_completion_stream(&state.llm, request_body).await {
                    Ok(rx) => rx,
                    Err(e) => {
                        error!("Upstream completion call failed: {:?}", e);
                        emit(GenEvent::Error("Upstream model call failed".to_string())).await;
                        return;
                    }
                }
            }
        };

        let mut round_content = String::new();
        let mut pending = PendingToolCalls::default();
        let mut finish: Option<String> = None;

        while let Some(chunk) = rx.recv().await {
            match chunk {
                CompletionChunk::Chunk(chunk_json) => {
                    if let Some(delta) = chunk_json["choices"][0]["delta"]["content"].as_str() {
                        if !delta.is_empty() {
                            round_content.push_str(delta);
                            emit(GenEvent::TextDelta(delta.to_string())).await;
                        }
                    }

                    if let Some(call_deltas) =
                        chunk_json["choices"][0]["delta"]["tool_calls"].as_array()
                    {
                        pending.absorb(call_deltas);
                    }

                    if let Some(reason) = llm::finish_reason(&chunk_json) {
                        finish = Some(reason);
                    }
                }
                CompletionChunk::Done => break,
                CompletionChunk::Error(message) => {
                    error!("Stream error from completion API: {}", message);
                    emit(GenEvent::Error(message)).await;
                    return;
                }
            }
        }

        let calls = pending.into_calls();
        let wants_tools = finish.as_deref() == Some("tool_calls") && !calls.is_empty();

        if !wants_tools || step + 1 >= MAX_TOOL_STEPS {
            if wants_tools {
                warn!(
                    "Tool-call limit of {} steps reached, finishing with partial answer",
                    MAX_TOOL_STEPS
                );
            }
            let reason = finish.unwrap_or_else(|| "stop".to_string());
            emit(GenEvent::Finish { reason }).await;
            return;
        }

        // Feed the round back: the assistant turn with its tool calls, then
        // one tool message per executed call.
        transcript.push(json!({
            "role": "assistant",
            "content": round_content,
            "tool_calls": calls.iter().map(|c| json!({
                "id": c.id,
                "type": "function",
                "function": {"name": c.name, "arguments": c.arguments},
            })).collect::<Vec<_>>(),
        }));

        for call in calls {
            debug!("Executing tool '{}' (step {})", call.name, step + 1);
            let result = registry.dispatch(&call.name, &call.arguments).await;
            let result_json = result.into_message_content();

            emit(GenEvent::ToolResult {
                name: call.name.clone(),
                result_json: result_json.clone(),
            })
            .await;

            transcript.push(json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": result_json,
            }));
        }

        step += 1;
    }
}

/// Accumulates the generated exchange and persists it once generation
/// finishes. Failure is recorded on the stream row rather than silently
/// swallowed; the client response is unaffected either way.
async fn storage_task(
    mut rx: mpsc::Receiver<GenEvent>,
    db: Arc<dyn DBConnection + Send + Sync>,
    chat_id: Uuid,
    stream_id: Uuid,
    user_row: NewMessage,
) {
    let mut content = String::with_capacity(4096);
    let mut tool_invocations: Vec<Value> = Vec::new();
    let mut outcome: Option<Result<String, String>> = None;

    while let Some(ev) = rx.recv().await {
        match ev {
            GenEvent::TextDelta(delta) => content.push_str(&delta),
            GenEvent::ToolResult { name, result_json } => {
                let result: Value =
                    serde_json::from_str(&result_json).unwrap_or(Value::String(result_json));
                tool_invocations.push(json!({"tool": name, "result": result}));
            }
            GenEvent::Finish { reason } => {
                outcome = Some(Ok(reason));
                break;
            }
            GenEvent::Error(message) => {
                outcome = Some(Err(message));
                break;
            }
        }
    }

    match outcome {
        Some(Ok(reason)) => {
            let meta_json = if tool_invocations.is_empty() {
                None
            } else {
                Some(json!({"toolInvocations": tool_invocations}))
            };

            let assistant_row = NewMessage {
                id: Uuid::new_v4(),
                chat_id,
                role: ROLE_ASSISTANT.to_string(),
                content,
                meta_json,
                created_at: Utc::now(),
            };

            let rows = [user_row, assistant_row];
            match db.save_messages(chat_id, &rows) {
                Ok(inserted) => {
                    info!(
                        "Persisted {} message(s) for chat {} (finish: {})",
                        inserted, chat_id, reason
                    );
                    if let Err(e) = db.update_stream_status(stream_id, StreamStatus::Closed) {
                        error!("Failed to close stream {}: {:?}", stream_id, e);
                    }
                }
                Err(e) => {
                    error!("Failed to persist transcript for chat {}: {:?}", chat_id, e);
                    if let Err(e) = db.update_stream_status(stream_id, StreamStatus::Error) {
                        error!("Failed to mark stream {} as errored: {:?}", stream_id, e);
                    }
                }
            }
        }
        Some(Err(message)) => {
            warn!(
                "Generation for chat {} failed before completion: {}",
                chat_id, message
            );
            if let Err(e) = db.update_stream_status(stream_id, StreamStatus::Error) {
                error!("Failed to mark stream {} as errored: {:?}", stream_id, e);
            }
        }
        None => {
            // Channel closed without a terminal event; treat like a failure
            // so the stream row never stays active.
            warn!("Generation channel for chat {} closed unexpectedly", chat_id);
            if let Err(e) = db.update_stream_status(stream_id, StreamStatus::Error) {
                error!("Failed to mark stream {} as errored: {:?}", stream_id, e);
            }
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/chat",
            post(chat).layer(from_fn_with_state(state.clone(), require_user)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_fragments_reassemble() {
        let mut pending = PendingToolCalls::default();
        pending.absorb(&[
            json!({"index": 0, "id": "call_1", "function": {"name": "record_", "arguments": ""}}),
            json!({"index": 0, "function": {"name": "rating", "arguments": "{\"rat"}}),
        ]);
        pending.absorb(&[json!({"index": 0, "function": {"arguments": "ing\": 5}"}})]);

        let calls = pending.into_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "record_rating");
        assert_eq!(calls[0].arguments, "{\"rating\": 5}");
    }

    #[test]
    fn interleaved_parallel_tool_calls_keep_their_slots() {
        let mut pending = PendingToolCalls::default();
        pending.absorb(&[
            json!({"index": 0, "id": "a", "function": {"name": "record_visitor", "arguments": "{}"}}),
            json!({"index": 1, "id": "b", "function": {"name": "record_revenue", "arguments": "{}"}}),
        ]);

        let calls = pending.into_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "record_visitor");
        assert_eq!(calls[1].name, "record_revenue");
    }

    #[test]
    fn nameless_fragments_are_dropped() {
        let mut pending = PendingToolCalls::default();
        pending.absorb(&[json!({"index": 0, "id": "x", "function": {"arguments": "{}"}})]);
        assert!(pending.into_calls().is_empty());
    }

    #[test]
    fn chat_request_accepts_both_body_variants() {
        let single: ChatRequest = serde_json::from_str(
            r#"{"id": "7f8a6f3e-52a1-4f38-9d1c-0f2b6b2f3a10", "message": {"role": "user", "content": "hello"}}"#,
        )
        .unwrap();
        assert!(single.message.is_some());

        let full: ChatRequest = serde_json::from_str(
            r#"{"id": "7f8a6f3e-52a1-4f38-9d1c-0f2b6b2f3a10", "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "and now?"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(full.messages.unwrap().len(), 3);
    }
}

//! Chat endpoints: request/response over HTTP and streaming over WebSockets.
//!
//! The chat WebSocket carries one conversation per connection; the tasks
//! WebSocket is a read-only feed of task-list snapshots. Pushes are best
//! effort, most-recent state only.

use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AppState;
use crate::agent::AgentReply;
use crate::error::{ApiError, ApiResult};
use crate::types::{ChatRequest, ChatResponse, MAX_CHAT_MESSAGE_LEN, Task};

/// Keepalive interval for the tasks feed.
const KEEPALIVE: Duration = Duration::from_secs(30);

/// Default session for HTTP chat callers that do not supply one.
const DEFAULT_SESSION: &str = "default";

fn validate_message(message: &str) -> ApiResult<()> {
    if message.trim().is_empty() {
        return Err(ApiError::missing_field("message"));
    }
    if message.chars().count() > MAX_CHAT_MESSAGE_LEN {
        return Err(ApiError::invalid_value(
            "message",
            &format!("message must be at most {} characters", MAX_CHAT_MESSAGE_LEN),
        ));
    }
    Ok(())
}

/// Task snapshot to return with a chat reply. Only broadcast to the tasks
/// feed when the agent actually ran a tool; pure conversation changes
/// nothing, so subscribers have nothing to learn.
fn chat_snapshot(state: &AppState, reply: &AgentReply) -> ApiResult<Arc<Vec<Task>>> {
    if reply.touched_tasks() {
        state.broadcast_snapshot()
    } else {
        Ok(Arc::new(state.task_snapshot()?))
    }
}

/// `POST /api/chat` — one agent round-trip, then a snapshot broadcast.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    validate_message(&request.message)?;
    let session_id = request.session_id.as_deref().unwrap_or(DEFAULT_SESSION);

    let reply = state.agent.handle_message(session_id, &request.message).await?;
    let snapshot = chat_snapshot(&state, &reply)?;

    Ok(Json(ChatResponse {
        response: reply.response,
        task_updates: snapshot.as_ref().clone(),
        tools_used: reply.tools_used,
    }))
}

/// Server-to-client WebSocket envelope.
fn envelope(kind: &str, data: Value) -> Message {
    Message::Text(json!({ "type": kind, "data": data }).to_string().into())
}

/// Client frame on the chat socket.
#[derive(Debug, Deserialize)]
struct WsChatFrame {
    #[serde(default)]
    message: Option<String>,
    /// `clear` resets the conversation history for this session.
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// `WS /api/chat/ws` — context-aware chat over a long-lived socket.
pub async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_chat_socket(state, socket))
}

async fn handle_chat_socket(state: AppState, socket: WebSocket) {
    let session_id = Uuid::new_v4().to_string();
    state.connections.chat.fetch_add(1, Ordering::Relaxed);
    debug!(session = %session_id, "chat socket connected");

    let (mut sink, mut stream) = socket.split();

    let greeting = envelope(
        "connection",
        json!({
            "message": "Connected to the task assistant",
            "session_id": session_id,
        }),
    );
    if sink.send(greeting).await.is_err() {
        cleanup_chat(&state, &session_id);
        return;
    }

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if text.as_str() == "ping" {
                    let _ = sink.send(Message::Text("pong".into())).await;
                    continue;
                }
                if handle_chat_frame(&state, &session_id, text.as_str(), &mut sink)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Message::Ping(payload) => {
                if sink.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    cleanup_chat(&state, &session_id);
    debug!(session = %session_id, "chat socket disconnected");
}

fn cleanup_chat(state: &AppState, session_id: &str) {
    state.connections.chat.fetch_sub(1, Ordering::Relaxed);
    // Session ids are per-connection, so history is unreachable after close.
    state.agent.remove_session(session_id);
}

/// Process one inbound chat frame. `Err` means the socket is gone.
async fn handle_chat_frame(
    state: &AppState,
    session_id: &str,
    raw: &str,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Result<(), ()> {
    let frame: WsChatFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => {
            return send_or_drop(
                sink,
                envelope("error", json!({ "message": "invalid JSON frame" })),
            )
            .await;
        }
    };

    if frame.kind.as_deref() == Some("clear") {
        state.agent.clear_session(session_id);
        return send_or_drop(sink, envelope("cleared", json!({}))).await;
    }

    let Some(message) = frame.message.filter(|m| !m.trim().is_empty()) else {
        return send_or_drop(
            sink,
            envelope("error", json!({ "message": "message is required" })),
        )
        .await;
    };
    if let Err(err) = validate_message(&message) {
        return send_or_drop(sink, envelope("error", json!({ "message": err.message }))).await;
    }

    match state.agent.handle_message(session_id, &message).await {
        Ok(reply) => {
            let snapshot = match chat_snapshot(state, &reply) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("snapshot after chat failed: {}", err);
                    Arc::new(Vec::new())
                }
            };
            send_or_drop(
                sink,
                envelope(
                    "chat_response",
                    json!({
                        "response": reply.response,
                        "task_updates": snapshot.as_ref(),
                        "tools_used": reply.tools_used,
                    }),
                ),
            )
            .await
        }
        Err(err) => {
            warn!(session = %session_id, "agent error: {}", err);
            // Upstream failures stay generic on the wire.
            send_or_drop(
                sink,
                envelope("error", json!({ "message": "error processing message" })),
            )
            .await
        }
    }
}

async fn send_or_drop(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
) -> Result<(), ()> {
    sink.send(message).await.map_err(|_| ())
}

/// `WS /api/chat/ws/tasks` — read-only feed of task-list snapshots.
pub async fn tasks_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_tasks_socket(state, socket))
}

async fn handle_tasks_socket(state: AppState, socket: WebSocket) {
    state.connections.tasks.fetch_add(1, Ordering::Relaxed);
    let mut updates = state.updates.subscribe();
    let (mut sink, mut stream) = socket.split();

    let connected = sink
        .send(envelope(
            "connection",
            json!({ "message": "Connected to task updates" }),
        ))
        .await;
    if connected.is_err() {
        state.connections.tasks.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    // Initial snapshot; an empty list if the store is briefly unavailable.
    let initial = state.task_snapshot().unwrap_or_default();
    if sink
        .send(envelope("task_update", json!({ "tasks": initial })))
        .await
        .is_err()
    {
        state.connections.tasks.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let mut keepalive = tokio::time::interval(KEEPALIVE);
    keepalive.reset();

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    let frame = envelope("task_update", json!({ "tasks": snapshot.as_ref() }));
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                // Lagged receivers skip to the most recent snapshot on the
                // next send; best effort is the contract here.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "task feed lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                    if sink.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
            _ = keepalive.tick() => {
                if sink.send(envelope("ping", json!({}))).await.is_err() {
                    break;
                }
            }
        }
    }

    state.connections.tasks.fetch_sub(1, Ordering::Relaxed);
}

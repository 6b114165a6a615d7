//! Agent WebSocket endpoint
//!
//! Each connected agent holds one socket. The first frame must be a
//! `Register`; after admission the socket task relays outbound command
//! frames, records inbound heartbeats, and routes command results back to
//! the dispatches waiting on them. The task exits on close, protocol error,
//! or cancellation (liveness expiry or server shutdown), removing the agent
//! from the registry on the way out.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use muster_core::AgentName;
use muster_protocol::message::ErrorCode;
use muster_protocol::{codec, Message};

use crate::dispatch::AgentResult;
use crate::registry::AgentHandle;
use crate::state::ServerState;

/// How long a fresh connection gets to send its `Register` frame.
const REGISTER_DEADLINE: Duration = Duration::from_secs(10);

/// Outbound channel depth per agent connection.
const OUTBOUND_BUFFER: usize = 64;

/// `GET /ws/agent` — upgrade an agent connection.
pub async fn agent_ws(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_agent_socket(socket, state))
}

async fn handle_agent_socket(socket: WebSocket, state: ServerState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Registration handshake
    let name = match await_registration(&mut ws_tx, &mut ws_rx).await {
        Some(name) => name,
        None => return,
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let cancel = CancellationToken::new();
    let handle = Arc::new(AgentHandle::new(name.clone(), outbound_tx, cancel.clone()));

    // Duplicate-name policy: reject the newcomer, keep the live agent.
    if state.registry.admit(Arc::clone(&handle)).is_err() {
        tracing::warn!("Rejected duplicate agent name: {}", name);
        let ack = Message::RegisterAck {
            accepted: false,
            reason: Some(format!("agent name already taken: {}", name)),
        };
        send_frame(&mut ws_tx, &ack).await;
        let _ = ws_tx.close().await;
        return;
    }

    let ack = Message::RegisterAck {
        accepted: true,
        reason: None,
    };
    if !send_frame(&mut ws_tx, &ack).await {
        state.registry.remove_if_current(&handle);
        return;
    }

    run_socket_loop(&state, &name, &handle, ws_tx, ws_rx, outbound_rx, cancel).await;

    // Remove only our own handle: the liveness monitor may have expired
    // this agent and a reconnected successor may already own the name.
    state.registry.remove_if_current(&handle);
    tracing::info!("Agent disconnected: {}", name);
}

/// Wait for the `Register` frame and validate the offered name.
async fn await_registration(
    ws_tx: &mut SplitSink<WebSocket, WsMessage>,
    ws_rx: &mut SplitStream<WebSocket>,
) -> Option<AgentName> {
    let frame = match tokio::time::timeout(REGISTER_DEADLINE, ws_rx.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => text,
        Ok(_) => {
            tracing::debug!("Agent connection closed before registration");
            return None;
        }
        Err(_) => {
            tracing::warn!("Agent connection timed out before registration");
            return None;
        }
    };

    let message = match codec::decode(&frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Undecodable registration frame: {}", e);
            reject(ws_tx, ErrorCode::InvalidRegistration, "invalid registration frame").await;
            return None;
        }
    };

    let Message::Register { name, hostname, version } = message else {
        reject(ws_tx, ErrorCode::InvalidRegistration, "first frame must be register").await;
        return None;
    };

    let Some(name) = AgentName::new(name) else {
        reject(ws_tx, ErrorCode::InvalidRegistration, "agent name must not be empty").await;
        return None;
    };

    tracing::info!(
        "Agent registering: {} (hostname: {}, protocol: {})",
        name,
        hostname,
        version.as_deref().unwrap_or("1.0")
    );
    Some(name)
}

async fn run_socket_loop(
    state: &ServerState,
    name: &AgentName,
    handle: &Arc<AgentHandle>,
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut ws_rx: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            // Command frames from the dispatcher
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { break };
                if !send_frame(&mut ws_tx, &message).await {
                    break;
                }
            }

            // Frames from the agent
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_agent_frame(state, name, handle, &text);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!("Socket error from {}: {}", name, e);
                        break;
                    }
                }
            }

            // Liveness expiry or server shutdown
            _ = cancel.cancelled() => {
                tracing::debug!("Connection to {} cancelled", name);
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
}

/// Process one decoded frame from a registered agent.
fn handle_agent_frame(state: &ServerState, name: &AgentName, handle: &Arc<AgentHandle>, text: &str) {
    let message = match codec::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Undecodable frame from {}: {}", name, e);
            return;
        }
    };

    match message {
        Message::Heartbeat { timestamp } => {
            // Only heartbeats refresh liveness; an agent expired by the
            // monitor in the meantime is not resurrected here. Liveness is
            // stamped with receipt time so a skewed agent clock cannot get
            // it expired mid-heartbeat (or kept alive forever).
            if state.registry.touch(name).is_err() {
                tracing::debug!("Heartbeat from already-removed agent {}", name);
            }
            tracing::trace!("Heartbeat from {} (agent clock: {})", name, timestamp);
        }
        Message::CommandResult { id, success, output } => {
            let delivered = handle.complete(id, AgentResult { success, output });
            if !delivered {
                tracing::debug!("Late command result from {} for {}", name, id);
            }
        }
        Message::Error { code, message } => {
            tracing::warn!("Error from {}: {:?} {}", name, code, message);
        }
        other => {
            tracing::warn!("Unexpected frame from {}: {:?}", name, other);
        }
    }
}

/// Encode and send one frame. Returns false when the socket is gone.
async fn send_frame(ws_tx: &mut SplitSink<WebSocket, WsMessage>, message: &Message) -> bool {
    let text = match codec::encode(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode frame: {}", e);
            return true; // Skip the frame, keep the connection
        }
    };
    ws_tx.send(WsMessage::Text(text)).await.is_ok()
}

async fn reject(ws_tx: &mut SplitSink<WebSocket, WsMessage>, code: ErrorCode, reason: &str) {
    let frame = Message::Error {
        code,
        message: reason.to_string(),
    };
    send_frame(ws_tx, &frame).await;
    let _ = ws_tx.close().await;
}

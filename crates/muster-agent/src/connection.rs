//! Server connection
//!
//! One connection at a time: connect, register, then relay heartbeats out
//! and command results back until the socket closes or the agent shuts
//! down. Reconnection policy lives in the caller's backoff loop.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;

use muster_core::config::AgentConfig;
use muster_core::time::current_time_millis;
use muster_protocol::{codec, Message, ProtocolError, PROTOCOL_VERSION};

use crate::executor;

/// How long to wait for the server's registration ack.
const REGISTER_ACK_DEADLINE: Duration = Duration::from_secs(10);

/// Errors that end one connection attempt
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Transport-level failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server refused the registration.
    ///
    /// Usually a name conflict; after the server expires the stale entry a
    /// retry will succeed, so this is retryable.
    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    /// The connection closed before the handshake finished
    #[error("Connection closed during registration")]
    ClosedDuringHandshake,
}

/// Derive the agent WebSocket URL from the configured server URL.
pub fn websocket_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{}", base)
    };
    format!("{}/ws/agent", base)
}

/// Run one connection until it closes.
///
/// Returns `Ok(())` on an orderly close (server shutdown or cancellation);
/// errors are left to the caller's backoff loop.
pub async fn run_connection(
    config: &AgentConfig,
    name: &str,
    hostname: &str,
    cancel: &CancellationToken,
) -> Result<(), ConnectionError> {
    let url = websocket_url(&config.server_url);
    tracing::info!("Connecting to {}", url);

    let (socket, _) = connect_async(&url).await?;
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Registration handshake
    let register = Message::Register {
        name: name.to_string(),
        hostname: hostname.to_string(),
        version: Some(PROTOCOL_VERSION.to_string()),
    };
    ws_tx.send(WsMessage::Text(codec::encode(&register)?)).await?;

    let ack = tokio::time::timeout(REGISTER_ACK_DEADLINE, ws_rx.next())
        .await
        .map_err(|_| ConnectionError::ClosedDuringHandshake)?;
    match ack {
        Some(Ok(WsMessage::Text(text))) => match codec::decode(&text)? {
            Message::RegisterAck { accepted: true, .. } => {
                tracing::info!("Registered as {}", name);
            }
            Message::RegisterAck { accepted: false, reason } => {
                return Err(ConnectionError::RegistrationRejected(
                    reason.unwrap_or_else(|| "no reason given".to_string()),
                ));
            }
            Message::Error { message, .. } => {
                return Err(ConnectionError::RegistrationRejected(message));
            }
            other => {
                tracing::warn!("Unexpected frame during registration: {:?}", other);
                return Err(ConnectionError::ClosedDuringHandshake);
            }
        },
        Some(Ok(_)) | None => return Err(ConnectionError::ClosedDuringHandshake),
        Some(Err(e)) => return Err(e.into()),
    }

    // Executor tasks push their results through this channel so a running
    // command never blocks heartbeats.
    let (result_tx, mut result_rx) = mpsc::channel::<Message>(32);
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    let exec_timeout = config.exec_timeout;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let frame = Message::Heartbeat { timestamp: current_time_millis() };
                ws_tx.send(WsMessage::Text(codec::encode(&frame)?)).await?;
            }

            Some(result) = result_rx.recv() => {
                ws_tx.send(WsMessage::Text(codec::encode(&result)?)).await?;
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_server_frame(&text, exec_timeout, &result_tx);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!("Server closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("Shutting down connection");
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                return Ok(());
            }
        }
    }
}

/// Process one frame from the server.
fn handle_server_frame(text: &str, exec_timeout: Duration, result_tx: &mpsc::Sender<Message>) {
    let message = match codec::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Undecodable frame from server: {}", e);
            return;
        }
    };

    match message {
        Message::Command { id, body } => {
            tracing::info!("Executing command {}", id);
            let result_tx = result_tx.clone();
            tokio::spawn(async move {
                let outcome = executor::execute(&body, exec_timeout).await;
                let frame = Message::CommandResult {
                    id,
                    success: outcome.success,
                    output: outcome.output,
                };
                if result_tx.send(frame).await.is_err() {
                    tracing::warn!("Connection gone before result for {} was sent", id);
                }
            });
        }
        Message::Error { code, message } => {
            tracing::warn!("Error from server: {:?} {}", code, message);
        }
        other => {
            tracing::warn!("Unexpected frame from server: {:?}", other);
        }
    }
}

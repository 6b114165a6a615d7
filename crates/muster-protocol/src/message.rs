//! Message types for the muster agent channel
//!
//! Messages are exchanged as JSON text frames over a WebSocket connection.
//! The `type` tag on the wire matches the variant name in snake_case.
//!
//! # Message Flow
//!
//! 1. Agent connects and sends `Register` (with optional version)
//! 2. Server responds with `RegisterAck`; a rejected registration closes
//!    the connection
//! 3. Agent sends `Heartbeat` on a fixed interval; heartbeats are the only
//!    liveness signal, command traffic never refreshes liveness
//! 4. Server sends `Command` frames; the agent answers each with a
//!    `CommandResult` carrying the same `id`
//!
//! Command/result correlation is by `CommandId`, so multiple commands may be
//! in flight on one connection without their results crossing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current protocol version string.
///
/// Included in `Register` messages. A `Register` without a version is
/// treated as version 1.0.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Correlation identifier for a command in flight on an agent connection.
pub type CommandId = Uuid;

/// Error codes carried in `Error` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown error
    Unknown,
    /// The first frame was not a valid registration
    InvalidRegistration,
    /// A frame could not be parsed
    InvalidMessage,
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Agent registration.
    ///
    /// Sent by the agent as the first frame after connecting. The name must
    /// be unique among currently connected agents; a taken name is rejected
    /// via `RegisterAck { accepted: false }`.
    Register {
        /// Unique agent name
        name: String,
        /// Hostname of the agent machine
        hostname: String,
        /// Protocol version (e.g., "1.0"). Optional for backward compatibility.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },

    /// Registration acknowledgment
    RegisterAck {
        /// Whether registration was accepted
        accepted: bool,
        /// Reason if not accepted
        reason: Option<String>,
    },

    /// Explicit liveness signal from the agent
    Heartbeat {
        /// Agent-side timestamp in milliseconds since the Unix epoch
        timestamp: u64,
    },

    /// Command for the agent to execute
    Command {
        /// Correlation id, echoed back in the matching `CommandResult`
        id: CommandId,
        /// Command text
        body: String,
    },

    /// Outcome of a previously delivered command
    CommandResult {
        /// Correlation id of the originating `Command`
        id: CommandId,
        /// Whether the command completed successfully
        success: bool,
        /// Captured output (stdout on success, stderr or a diagnostic otherwise)
        output: String,
    },

    /// Error report
    Error {
        /// Error code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

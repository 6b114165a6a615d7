//! muster-server: Agent registry and command dispatch daemon
//!
//! The server accepts long-lived WebSocket connections from remote agents,
//! tracks their liveness via explicit heartbeats, and exposes a small HTTP
//! API through which an authenticated operator lists connected agents and
//! dispatches commands to one or all of them.

pub mod api;
pub mod auth;
pub mod dispatch;
pub mod liveness;
pub mod registry;
pub mod state;

pub use registry::{AgentHandle, AgentRegistry};
pub use state::ServerState;

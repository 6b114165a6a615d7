//! muster-agent: Remote agent daemon
//!
//! The agent runs on remote machines, maintains a WebSocket connection to
//! the muster server, heartbeats on a fixed interval, and executes commands
//! delivered over the connection.

pub mod backoff;
pub mod connection;
pub mod executor;

pub use backoff::ExponentialBackoff;
pub use connection::{run_connection, ConnectionError};

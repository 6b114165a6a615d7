//! muster-protocol: Wire protocol for the muster agent channel
//!
//! This crate defines the JSON messages exchanged between the server and
//! remote agents over a WebSocket connection.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode, encode, MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use message::{CommandId, Message, PROTOCOL_VERSION};

//! Encoding and decoding of protocol frames
//!
//! Frames are JSON text; both sides enforce a maximum frame size so a
//! misbehaving peer cannot force unbounded allocation.

use crate::error::ProtocolError;
use crate::message::Message;

/// Maximum encoded frame size (256 KiB).
///
/// Command output is the largest payload on this channel; anything beyond
/// this bound is rejected rather than buffered.
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Encode a message into a JSON text frame.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(message)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(text)
}

/// Decode a JSON text frame into a message.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(serde_json::from_str(text)?)
}

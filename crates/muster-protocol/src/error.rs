//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame exceeds maximum size
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

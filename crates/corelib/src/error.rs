//! Error types for the core library.

use thiserror::Error;

use crate::frame::FrameError;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// Node id is not valid base64 text
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),
    /// Contact cannot be dialed or parsed
    #[error("Invalid contact: {0}")]
    InvalidContact(String),
    /// Frame failed to decode
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
    /// JSON encoding or decoding of a message failed
    #[error("Message encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

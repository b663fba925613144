//! Connection framing.
//!
//! Every message on the wire, request or response, is a single payload
//! followed by the two-byte terminator `CR LF`. There is no escaping and no
//! length prefix: a connection carries exactly one frame in each direction,
//! so the terminator only has to mark the end of a well-formed delivery.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Terminator appended to every payload.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// Reasons a delivery is rejected as a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the terminator itself.
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    /// The last two bytes are not `CR LF`.
    #[error("frame is not terminated by CR LF")]
    MissingTerminator,
}

/// Appends the terminator to `payload`.
///
/// The payload must not itself end in `CR LF`; callers only ever pass encoded
/// ids or serialized JSON, neither of which does.
pub fn encode(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(payload.len() + TERMINATOR.len());
    frame.put_slice(payload);
    frame.put_slice(TERMINATOR);
    frame.freeze()
}

/// Validates the terminator and returns the payload without it.
pub fn decode(frame: &[u8]) -> Result<&[u8], FrameError> {
    if frame.len() < TERMINATOR.len() {
        return Err(FrameError::TooShort(frame.len()));
    }
    match frame.strip_suffix(TERMINATOR) {
        Some(payload) => Ok(payload),
        None => Err(FrameError::MissingTerminator),
    }
}

//! Transport error types.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the listening side of the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listener could not be bound (port taken, host unresolvable, ...).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Socket-level failure after binding.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal outcome of a failed `findNode` call.
///
/// The display strings of `Unreachable` and `NoAnswer` are part of the event
/// contract: discovery layers match on `"unreachable"` and `"error"`.
#[derive(Debug, Clone, Error)]
pub enum FindNodeError {
    /// The connection could not be established or failed mid-exchange.
    #[error("unreachable")]
    Unreachable(#[source] Arc<io::Error>),
    /// The peer closed the connection without ever sending data.
    #[error("error")]
    NoAnswer,
    /// The peer sent data that is not a JSON value.
    #[error("malformed response")]
    MalformedResponse(#[source] Arc<serde_json::Error>),
    /// The request itself could not be encoded.
    #[error("invalid request")]
    Request(#[source] Arc<corelib::Error>),
}

impl FindNodeError {
    pub(crate) fn unreachable(err: io::Error) -> Self {
        FindNodeError::Unreachable(Arc::new(err))
    }

    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        FindNodeError::MalformedResponse(Arc::new(err))
    }

    /// True for the outcomes that are reported as a `Node` event.
    pub fn is_reportable(&self) -> bool {
        matches!(self, FindNodeError::Unreachable(_) | FindNodeError::NoAnswer)
    }
}

/// Error a `findNode` handler reports instead of a response. The connection is
/// closed without writing anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler error: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        HandlerError(reason.into())
    }
}

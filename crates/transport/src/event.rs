//! Events posted by outbound calls.

use corelib::{Contact, NodeId};
use serde_json::Value;

use crate::error::FindNodeError;

/// Outcome notifications, delivered to every subscriber of a transport.
///
/// A single outbound call posts at most one terminal event, plus the
/// `Unreachable` side channel when a `findNode` connection fails.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A `findNode` call finished with a response, `Unreachable` or `NoAnswer`.
    Node {
        result: Result<Value, FindNodeError>,
        contact: Contact,
        target: NodeId,
    },
    /// A ping saw the peer close cleanly.
    Reached(Contact),
    /// A connection to the contact could not be established or failed.
    Unreachable(Contact),
}

impl TransportEvent {
    pub fn contact(&self) -> &Contact {
        match self {
            TransportEvent::Node { contact, .. } => contact,
            TransportEvent::Reached(contact) | TransportEvent::Unreachable(contact) => contact,
        }
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Reached,
    Unreachable,
}

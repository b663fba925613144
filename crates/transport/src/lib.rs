//! TCP transport for node discovery.
//!
//! This crate provides the connection-level protocol behind `findNode` and
//! `ping`:
//! - A listener that frames inbound requests and hands them to a handler
//! - Outbound `ping` liveness probes
//! - Outbound `findNode` queries with an unreachable / no-answer / response
//!   outcome taxonomy
//!
//! One request and one response per connection, each terminated by CR LF.
//! No pooling, retries or timeouts.

mod client;
pub mod error;
pub mod event;
pub mod server;
pub mod transport;

pub use error::{FindNodeError, HandlerError, TransportError};
pub use event::{PingOutcome, TransportEvent};
pub use server::{ChannelHandler, FindNodeHandler, InboundRequest, Responder};
pub use transport::TcpTransport;

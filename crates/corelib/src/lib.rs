//! Core library for the discovery TCP transport.
//!
//! This crate provides the transport-agnostic pieces:
//! - Node ids, contacts and sender info
//! - The CR LF connection framer
//! - The `findNode` request body
//! - Transport configuration

pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod node;

pub use config::TransportConfig;
pub use error::{Error, Result};
pub use frame::FrameError;
pub use message::FindNodeRequest;
pub use node::{Contact, NodeId, SenderInfo};

//! Command-line front end for the discovery TCP transport.
//!
//! Provides commands for:
//! - Serving `findNode` requests from a static peer list
//! - Pinging a contact
//! - Sending a `findNode` query

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;

//! CLI subcommands.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use corelib::config::{DEFAULT_HOST, DEFAULT_PORT};
use corelib::{Contact, FindNodeRequest, NodeId, SenderInfo, TransportConfig};
use serde_json::Value;
use tracing::{debug, info};
use transport::{HandlerError, PingOutcome, Responder, TcpTransport};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve findNode requests from a static list of known peers
    Listen(ListenArgs),
    /// Check whether a contact accepts connections
    Ping(PingArgs),
    /// Ask a contact for nodes close to a target id
    FindNode(FindNodeArgs),
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Known peer as id@host:port (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<Contact>,
}

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Contact as id@host:port
    pub contact: Contact,
    /// Source address for the outbound connection
    #[arg(long)]
    pub local_address: Option<IpAddr>,
}

#[derive(Debug, Args)]
pub struct FindNodeArgs {
    /// Contact as id@host:port
    pub contact: Contact,
    /// Base64 id of the node to find
    pub target: NodeId,
    #[arg(long)]
    pub sender_id: Option<NodeId>,
    #[arg(long)]
    pub sender_host: Option<String>,
    #[arg(long)]
    pub sender_port: Option<u16>,
    /// Source address for the outbound connection
    #[arg(long)]
    pub local_address: Option<IpAddr>,
    /// Give up after this many milliseconds (the transport itself never
    /// times out)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// What a command produced, printed to stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Closed,
    Ping(PingOutcome),
    Node(Value),
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Closed => write!(f, "closed"),
            CommandResult::Ping(PingOutcome::Reached) => write!(f, "reached"),
            CommandResult::Ping(PingOutcome::Unreachable) => write!(f, "unreachable"),
            CommandResult::Node(value) => write!(f, "{value}"),
        }
    }
}

impl Command {
    pub async fn execute(self) -> anyhow::Result<CommandResult> {
        match self {
            Command::Listen(args) => listen(args).await,
            Command::Ping(args) => {
                let transport = TcpTransport::new(outbound_config(args.local_address));
                Ok(CommandResult::Ping(transport.ping(&args.contact).await))
            }
            Command::FindNode(args) => find_node(args).await,
        }
    }
}

fn outbound_config(local_address: Option<IpAddr>) -> TransportConfig {
    let config = TransportConfig::default();
    match local_address {
        Some(addr) => config.with_local_address(addr),
        None => config,
    }
}

async fn listen(args: ListenArgs) -> anyhow::Result<CommandResult> {
    let peers: Arc<[Contact]> = args.peers.into();
    let handler = move |payload: String, mut responder: Responder| {
        let answer = answer_find_node(&peers, &payload);
        if let Err(e) = &answer {
            debug!("rejecting findNode request: {e}");
        }
        responder.respond(answer);
    };

    let mut transport = TcpTransport::bind(TransportConfig::new(args.host, args.port), handler)
        .await
        .context("failed to start listener")?;
    if let Some(addr) = transport.local_addr() {
        info!(%addr, "serving findNode");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    info!("shutting down");
    transport.close().await;
    Ok(CommandResult::Closed)
}

/// Answers with the matching peer as an object, or every known peer as an
/// array when none matches.
///
/// Requests are normally the JSON `findNode` body, but a bare encoded id is
/// accepted as well.
pub fn answer_find_node(peers: &[Contact], payload: &str) -> Result<Value, HandlerError> {
    let target = match FindNodeRequest::from_payload(payload) {
        Ok(request) => request.request.find_node,
        Err(_) => NodeId::from_encoded(payload)
            .map_err(|e| HandlerError::new(format!("unrecognized request: {e}")))?,
    };

    let answer = match peers.iter().find(|peer| peer.id == target) {
        Some(peer) => serde_json::to_value(peer),
        None => serde_json::to_value(peers),
    };
    answer.map_err(|e| HandlerError::new(e.to_string()))
}

async fn find_node(args: FindNodeArgs) -> anyhow::Result<CommandResult> {
    let transport = TcpTransport::new(outbound_config(args.local_address));
    let sender = SenderInfo {
        id: args.sender_id,
        host: args.sender_host,
        port: args.sender_port,
        data: None,
    };
    let call = transport.find_node(&args.contact, &args.target, Some(&sender));

    let result = match args.timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), call).await {
            Ok(result) => result,
            Err(_) => bail!("findNode to {} timed out after {ms} ms", args.contact),
        },
        None => call.await,
    };
    let value = result.with_context(|| format!("findNode to {} failed", args.contact))?;
    Ok(CommandResult::Node(value))
}

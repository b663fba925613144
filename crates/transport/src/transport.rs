//! The TCP transport: one optional listener plus per-call outbound sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use corelib::{Contact, FindNodeRequest, NodeId, SenderInfo, TransportConfig};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::client;
use crate::error::{FindNodeError, TransportError};
use crate::event::{PingOutcome, TransportEvent};
use crate::server::{FindNodeHandler, Server};

/// TCP transport for `findNode` and `ping`.
///
/// Outbound calls resolve to their outcome and also post it to every
/// subscriber (see [`TransportEvent`]). Inbound requests go to the handler
/// passed to [`TcpTransport::listen`].
#[derive(Debug)]
pub struct TcpTransport {
    config: TransportConfig,
    events: broadcast::Sender<TransportEvent>,
    server: Option<Server>,
}

impl TcpTransport {
    /// Creates a transport for `config`. Performs no I/O.
    pub fn new(config: TransportConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            events,
            server: None,
        }
    }

    /// Creates a transport and starts listening in one step.
    pub async fn bind(
        config: TransportConfig,
        handler: impl FindNodeHandler,
    ) -> Result<Self, TransportError> {
        let mut transport = Self::new(config);
        transport.listen(handler).await?;
        Ok(transport)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// New event subscriber. Only events posted after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Binds `(host, port)` and starts serving `findNode` requests. Resolves
    /// with the bound address once connections are being accepted.
    ///
    /// Calling this while already listening returns the current address and
    /// keeps the existing handler.
    pub async fn listen(&mut self, handler: impl FindNodeHandler) -> Result<SocketAddr, TransportError> {
        if let Some(server) = &self.server {
            debug!(local_addr = %server.local_addr(), "already listening");
            return Ok(server.local_addr());
        }

        let server = Server::bind(
            &self.config.host,
            self.config.port,
            Arc::new(handler),
            self.config.max_frame_size,
        )
        .await
        .map_err(|source| TransportError::Bind {
            addr: format!("{}:{}", self.config.host, self.config.port),
            source,
        })?;
        let local_addr = server.local_addr();
        self.server = Some(server);
        Ok(local_addr)
    }

    /// Address of the listener, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(Server::local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.server.is_some()
    }

    /// Stops accepting connections and resolves once in-flight inbound
    /// connections are finished. Does nothing if not listening.
    pub async fn close(&mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
    }

    /// Probes `contact` for liveness. No payload is exchanged.
    pub async fn ping(&self, contact: &Contact) -> PingOutcome {
        match client::probe(&self.config, contact).await {
            Ok(()) => {
                debug!(%contact, "ping reached");
                self.emit(TransportEvent::Reached(contact.clone()));
                PingOutcome::Reached
            }
            Err(e) => {
                debug!(%contact, "ping unreachable: {e}");
                self.emit(TransportEvent::Unreachable(contact.clone()));
                PingOutcome::Unreachable
            }
        }
    }

    /// Asks `contact` for nodes close to `target`, announcing `sender`.
    ///
    /// The peer answers with a JSON value: an object for an exact match, an
    /// array of near nodes otherwise. `Unreachable` and `NoAnswer` outcomes
    /// are also posted as a `Node` event; a malformed response is only
    /// returned and logged.
    pub async fn find_node(
        &self,
        contact: &Contact,
        target: &NodeId,
        sender: Option<&SenderInfo>,
    ) -> Result<Value, FindNodeError> {
        let request = FindNodeRequest::new(target.clone(), sender.cloned())
            .to_frame()
            .map_err(|e| FindNodeError::Request(Arc::new(e)))?;
        trace!(%contact, %target, bytes = request.len(), "sending findNode");

        let result = client::exchange(&self.config, contact, &request).await;
        match &result {
            Ok(_) => debug!(%contact, %target, "findNode answered"),
            Err(FindNodeError::Unreachable(source)) => {
                debug!(%contact, %target, "findNode unreachable: {source}")
            }
            Err(FindNodeError::MalformedResponse(source)) => {
                warn!(%contact, %target, "dropping malformed findNode response: {source}")
            }
            Err(e) => debug!(%contact, %target, "findNode failed: {e}"),
        }
        if let Err(e) = &result {
            if !e.is_reportable() {
                return result;
            }
        }

        self.emit(TransportEvent::Node {
            result: result.clone(),
            contact: contact.clone(),
            target: target.clone(),
        });
        if matches!(result, Err(FindNodeError::Unreachable(_))) {
            self.emit(TransportEvent::Unreachable(contact.clone()));
        }
        result
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}

//! Listening side: accept loop, per-connection framing and the one-shot
//! responder handed to `findNode` handlers.
//!
//! Each accepted connection carries exactly one request and at most one
//! response:
//!
//! ```text
//! OPEN -> data -> valid frame   -> handler -> response written -> CLOSED
//!              -> invalid frame -> CLOSED
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use corelib::frame;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace, warn};

use crate::error::HandlerError;

type Reply = Result<Value, HandlerError>;

/// Pause after a failed accept so persistent errors (EMFILE) do not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One-time capability to answer an inbound request.
///
/// The first call to [`Responder::respond`] consumes it. Later calls, or calls
/// made after the peer went away, do nothing and return `false`. Dropping an
/// unused responder closes the connection without a reply.
#[derive(Debug)]
pub struct Responder {
    reply: Option<oneshot::Sender<Reply>>,
    peer: SocketAddr,
}

impl Responder {
    fn new(peer: SocketAddr) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                reply: Some(tx),
                peer,
            },
            rx,
        )
    }

    /// `Ok(value)` writes `value` as a framed JSON response; `Err` closes the
    /// connection without replying. Returns whether the connection accepted
    /// the answer.
    pub fn respond(&mut self, response: Result<Value, HandlerError>) -> bool {
        match self.reply.take() {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                trace!(peer = %self.peer, "responder already used");
                false
            }
        }
    }

    pub fn reply(&mut self, value: Value) -> bool {
        self.respond(Ok(value))
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> bool {
        self.respond(Err(HandlerError::new(reason)))
    }

    /// True once the responder was used or the connection is gone.
    pub fn is_spent(&self) -> bool {
        self.reply.as_ref().map_or(true, |tx| tx.is_closed())
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// Receives every valid inbound `findNode` request.
///
/// `payload` is the request text without its terminator, with invalid UTF-8
/// replaced by U+FFFD. Implementations must eventually answer through
/// `responder` or drop it.
pub trait FindNodeHandler: Send + Sync + 'static {
    fn find_node(&self, payload: String, responder: Responder);
}

impl<F> FindNodeHandler for F
where
    F: Fn(String, Responder) + Send + Sync + 'static,
{
    fn find_node(&self, payload: String, responder: Responder) {
        self(payload, responder)
    }
}

/// An inbound request forwarded as a message.
#[derive(Debug)]
pub struct InboundRequest {
    pub payload: String,
    pub responder: Responder,
}

/// Handler that forwards requests into a channel. If the receiver is gone the
/// request's responder is dropped, closing the connection.
#[derive(Debug, Clone)]
pub struct ChannelHandler(mpsc::UnboundedSender<InboundRequest>);

impl ChannelHandler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InboundRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl From<mpsc::UnboundedSender<InboundRequest>> for ChannelHandler {
    fn from(tx: mpsc::UnboundedSender<InboundRequest>) -> Self {
        Self(tx)
    }
}

impl FindNodeHandler for ChannelHandler {
    fn find_node(&self, payload: String, responder: Responder) {
        if self.0.send(InboundRequest { payload, responder }).is_err() {
            debug!("findNode request dropped: receiver closed");
        }
    }
}

/// Handle on a running accept loop.
#[derive(Debug)]
pub(crate) struct Server {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Server {
    pub(crate) async fn bind(
        host: &str,
        port: u16,
        handler: Arc<dyn FindNodeHandler>,
        max_frame_size: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(accept_loop(listener, handler, max_frame_size, shutdown_rx));
        debug!(%local_addr, "listening for findNode requests");

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and waits for in-flight connections to finish.
    pub(crate) async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(local_addr = %self.local_addr, "accept loop ended abnormally: {e}");
        }
        debug!(local_addr = %self.local_addr, "listener closed");
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn FindNodeHandler>,
    max_frame_size: usize,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // Either an explicit close or the transport being dropped.
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(%peer, "accepted connection");
                    connections.spawn(serve_connection(stream, peer, handler.clone(), max_frame_size));
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

enum Settled {
    Reply(Value),
    Rejected(HandlerError),
    Abandoned,
    PeerGone,
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn FindNodeHandler>,
    max_frame_size: usize,
) {
    // One delivery is one frame; there is no reassembly.
    let mut delivery = BytesMut::with_capacity(max_frame_size);
    match stream.read_buf(&mut delivery).await {
        Ok(0) => {
            trace!(%peer, "peer closed before sending a request");
            return;
        }
        Ok(n) => trace!(%peer, bytes = n, "request delivery"),
        Err(e) => {
            debug!(%peer, "read failed: {e}");
            return;
        }
    }

    let payload = match frame::decode(&delivery) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(%peer, "dropping connection: {e}");
            let _ = stream.shutdown().await;
            return;
        }
    };
    // Invalid UTF-8 is replaced, not rejected: only the terminator decides.
    let payload = String::from_utf8_lossy(payload).into_owned();

    let (responder, reply) = Responder::new(peer);
    handler.find_node(payload, responder);

    let (mut reader, mut writer) = stream.split();
    let settled = tokio::select! {
        // An answer already queued wins over a peer that half-closed after
        // sending its request.
        biased;
        answer = reply => match answer {
            Ok(Ok(value)) => Settled::Reply(value),
            Ok(Err(e)) => Settled::Rejected(e),
            Err(_) => Settled::Abandoned,
        },
        _ = wait_for_close(&mut reader) => Settled::PeerGone,
    };

    match settled {
        Settled::Reply(value) => match serde_json::to_vec(&value) {
            Ok(body) => {
                let response = frame::encode(&body);
                if let Err(e) = writer.write_all(&response).await {
                    warn!(%peer, "failed to write findNode response: {e}");
                } else {
                    trace!(%peer, bytes = response.len(), "response written");
                }
            }
            Err(e) => warn!(%peer, "failed to serialize findNode response: {e}"),
        },
        Settled::Rejected(e) => debug!(%peer, "closing without response: {e}"),
        Settled::Abandoned => debug!(%peer, "handler dropped the responder"),
        // The responder's channel closes when we return, so any later answer is inert.
        Settled::PeerGone => {
            debug!(%peer, "peer left before a response was sent");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Resolves when the peer closes or errors. Extra data is discarded: a
/// connection carries a single request.
async fn wait_for_close<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut scratch = [0u8; 512];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(n) => trace!(bytes = n, "ignoring data after request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn peer() -> SocketAddr {
        "127.0.0.1:11234".parse().unwrap()
    }

    #[tokio::test]
    async fn test_responder_is_single_shot() {
        let (mut responder, rx) = Responder::new(peer());
        assert!(!responder.is_spent());

        assert!(responder.reply(json!({"host": "192.168.1.13", "port": 1234})));
        assert!(responder.is_spent());
        assert!(!responder.reply(json!([])));
        assert!(!responder.reject("late"));

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered, json!({"host": "192.168.1.13", "port": 1234}));
    }

    #[tokio::test]
    async fn test_responder_inert_after_connection_gone() {
        let (mut responder, rx) = Responder::new(peer());
        drop(rx);
        assert!(responder.is_spent());
        assert!(!responder.reply(json!([])));
    }

    #[tokio::test]
    async fn test_channel_handler_forwards_requests() {
        let (handler, mut rx) = ChannelHandler::channel();
        let (responder, reply) = Responder::new(peer());

        handler.find_node("Zm9v".to_string(), responder);

        let mut request = rx.recv().await.unwrap();
        assert_eq!(request.payload, "Zm9v");
        assert_eq!(request.responder.peer(), peer());
        request.responder.reject("not found");
        assert_eq!(reply.await.unwrap(), Err(HandlerError::new("not found")));
    }

    #[tokio::test]
    async fn test_channel_handler_without_receiver_drops_responder() {
        let (handler, rx) = ChannelHandler::channel();
        drop(rx);
        let (responder, reply) = Responder::new(peer());

        handler.find_node("Zm9v".to_string(), responder);
        assert!(reply.await.is_err());
    }
}

//! Dialing side. Every call opens its own socket and never reuses it.

use std::io;
use std::net::{IpAddr, SocketAddr};

use bytes::BytesMut;
use corelib::{Contact, TransportConfig};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::trace;

use crate::error::FindNodeError;

const READ_CHUNK: usize = 4096;

/// Opens a fresh connection to `contact`, bound to the configured source
/// address if there is one.
pub(crate) async fn connect(config: &TransportConfig, contact: &Contact) -> io::Result<TcpStream> {
    contact
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let target = (contact.host.as_str(), contact.port);
    let stream = match config.local_address {
        None => TcpStream::connect(target).await?,
        Some(local) => connect_from(local, lookup_host(target).await?).await?,
    };
    trace!(%contact, local = ?stream.local_addr().ok(), "connected");
    Ok(stream)
}

async fn connect_from(
    local: IpAddr,
    candidates: impl Iterator<Item = SocketAddr>,
) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in candidates.filter(|addr| addr.is_ipv4() == local.is_ipv4()) {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.bind(SocketAddr::new(local, 0))?;
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address of the same family as {local}"),
        )
    }))
}

/// Connects, closes the write side and waits for the peer to close.
pub(crate) async fn probe(config: &TransportConfig, contact: &Contact) -> io::Result<()> {
    let mut stream = connect(config, contact).await?;
    stream.shutdown().await?;

    let mut scratch = [0u8; 512];
    loop {
        if stream.read(&mut scratch).await? == 0 {
            return Ok(());
        }
    }
}

/// Writes a framed request and reads until a complete JSON value arrives or
/// the peer closes.
///
/// Deliveries are accumulated, so a response split across several reads is
/// still parsed as one value.
pub(crate) async fn exchange(
    config: &TransportConfig,
    contact: &Contact,
    request: &[u8],
) -> Result<Value, FindNodeError> {
    let mut stream = connect(config, contact)
        .await
        .map_err(FindNodeError::unreachable)?;
    stream
        .write_all(request)
        .await
        .map_err(FindNodeError::unreachable)?;

    let mut response = BytesMut::with_capacity(READ_CHUNK);
    loop {
        let n = stream
            .read_buf(&mut response)
            .await
            .map_err(FindNodeError::unreachable)?;
        if n == 0 {
            if response.is_empty() {
                return Err(FindNodeError::NoAnswer);
            }
            return serde_json::from_slice(&response).map_err(FindNodeError::malformed);
        }
        trace!(%contact, bytes = n, "response delivery");

        match serde_json::from_slice::<Value>(&response) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_eof() && response.len() < config.max_frame_size => {
                response.reserve(READ_CHUNK);
            }
            Err(e) => return Err(FindNodeError::malformed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::NodeId;
    use tokio::net::TcpListener;

    fn contact(port: u16) -> Contact {
        Contact::new(NodeId::from_bytes("bar"), "127.0.0.1", port)
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_contact() {
        let err = connect(&TransportConfig::default(), &contact(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_connect_from_local_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = TransportConfig::default().with_local_address("127.0.0.1".parse().unwrap());

        let stream = connect(&config, &contact(port)).await.unwrap();
        let (_, remote) = listener.accept().await.unwrap();
        assert_eq!(remote, stream.local_addr().unwrap());
        assert_eq!(remote.ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_connect_from_mismatched_family() {
        let port = unused_port().await;
        let config = TransportConfig::default().with_local_address("::1".parse().unwrap());
        let err = connect(&config, &contact(port)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[tokio::test]
    async fn test_exchange_reassembles_split_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b"[{\"host\":\"192.168.1.14\",").await.unwrap();
            conn.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            conn.write_all(b"\"port\":334}]\r\n").await.unwrap();
            conn.shutdown().await.unwrap();
        });

        let value = exchange(&TransportConfig::default(), &contact(port), b"Zm9v\r\n")
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!([{"host": "192.168.1.14", "port": 334}]));
    }

    #[tokio::test]
    async fn test_exchange_truncated_response_is_malformed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b"{\"host\":").await.unwrap();
            conn.shutdown().await.unwrap();
        });

        let err = exchange(&TransportConfig::default(), &contact(port), b"Zm9v\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, FindNodeError::MalformedResponse(_)));
    }
}

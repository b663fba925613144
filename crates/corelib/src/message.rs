//! `findNode` request body.
//!
//! ```text
//! {"request":{"findNode":"<target id>"},"sender":{"id":..,"host":..,"port":..,"data":..}}\r\n
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame;
use crate::node::{NodeId, SenderInfo};

/// The query part of a request.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FindNodeQuery {
    #[serde(rename = "findNode")]
    pub find_node: NodeId,
}

/// A complete `findNode` request as written by the querying side.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FindNodeRequest {
    pub request: FindNodeQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
}

impl FindNodeRequest {
    pub fn new(target: NodeId, sender: Option<SenderInfo>) -> Self {
        Self {
            request: FindNodeQuery { find_node: target },
            sender,
        }
    }

    /// Id of the node being looked for.
    pub fn target(&self) -> &NodeId {
        &self.request.find_node
    }

    /// Serializes the request and appends the frame terminator.
    pub fn to_frame(&self) -> Result<Bytes> {
        let payload = serde_json::to_vec(self)?;
        Ok(frame::encode(&payload))
    }

    /// Parses a request payload as handed to an inbound handler (terminator
    /// already stripped).
    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::{json, Value};

    #[test]
    fn test_request_wire_layout() {
        let sender = SenderInfo {
            id: Some(NodeId::from_bytes("bar")),
            host: Some("127.0.0.1".into()),
            port: Some(11111),
            data: Some(json!("bar")),
        };
        let request = FindNodeRequest::new(NodeId::from_bytes("foo"), Some(sender));
        let frame = request.to_frame().unwrap();

        assert!(frame.ends_with(b"\r\n"));
        let body: Value = serde_json::from_slice(&frame[..frame.len() - 2]).unwrap();
        assert_eq!(
            body,
            json!({
                "request": {"findNode": "Zm9v"},
                "sender": {"id": "YmFy", "host": "127.0.0.1", "port": 11111, "data": "bar"}
            })
        );
    }

    #[test]
    fn test_request_without_sender() {
        let request = FindNodeRequest::new(NodeId::from_bytes("foo"), None);
        let frame = request.to_frame().unwrap();
        assert_eq!(&frame[..], b"{\"request\":{\"findNode\":\"Zm9v\"}}\r\n");
    }

    #[test]
    fn test_from_payload() {
        let request = FindNodeRequest::from_payload(
            r#"{"request":{"findNode":"Zm9v"},"sender":{"id":"YmFy"}}"#,
        )
        .unwrap();
        assert_eq!(request.target(), &NodeId::from_bytes("foo"));
        assert_eq!(
            request.sender.and_then(|s| s.id),
            Some(NodeId::from_bytes("bar"))
        );

        assert!(matches!(
            FindNodeRequest::from_payload("Zm9v"),
            Err(Error::Encoding(_))
        ));
    }
}

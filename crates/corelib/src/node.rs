//! Node identity and contact abstractions.
//!
//! Node ids are opaque binary identifiers. They travel and compare as their
//! base64 text so they can be embedded directly in JSON requests.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Base64-encoded node identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Encodes raw id bytes.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(BASE64_STANDARD.encode(bytes))
    }

    /// Wraps an already encoded id, checking that it is valid base64.
    pub fn from_encoded(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::InvalidNodeId(format!("{encoded:?}: {e}")))?;
        Ok(Self(encoded))
    }

    /// Decodes the id back into raw bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        BASE64_STANDARD
            .decode(self.0.as_bytes())
            .map_err(|e| Error::InvalidNodeId(format!("{:?}: {e}", self.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = Error;

    fn try_from(encoded: String) -> Result<Self> {
        Self::from_encoded(encoded)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_encoded(s)
    }
}

/// Remote peer endpoint.
///
/// Owned by the caller and only borrowed by the transport for the lifetime of
/// a single call.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Contact {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl Contact {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    /// Checks that the endpoint can be dialed: non-empty host, port in 1..=65535.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidContact(format!("{}: empty host", self.id)));
        }
        if self.port == 0 {
            return Err(Error::InvalidContact(format!("{}: port 0", self.id)));
        }
        Ok(())
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.id, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.id, self.host, self.port)
        }
    }
}

/// Parses `id@host:port`. IPv6 hosts are written in brackets.
impl FromStr for Contact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id, endpoint) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidContact(format!("{s:?}: expected id@host:port")))?;
        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidContact(format!("{s:?}: missing port")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidContact(format!("{s:?}: bad port: {e}")))?;

        let contact = Contact::new(NodeId::from_encoded(id)?, host, port);
        contact.validate()?;
        Ok(contact)
    }
}

/// Querier's own contact info, announced with every `findNode` request.
///
/// Every field is optional; absent fields are left out of the request body.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct SenderInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Arbitrary application data attached by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SenderInfo {
    pub fn with_id(id: NodeId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl From<&Contact> for SenderInfo {
    fn from(contact: &Contact) -> Self {
        Self {
            id: Some(contact.id.clone()),
            host: Some(contact.host.clone()),
            port: Some(contact.port),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_id_encodes_bytes() {
        let id = NodeId::from_bytes("foo");
        assert_eq!(id.as_str(), "Zm9v");
        assert_eq!(id.to_bytes().unwrap(), b"foo");
    }

    #[test]
    fn test_node_id_rejects_invalid_text() {
        assert!(NodeId::from_encoded("YmFy").is_ok());
        assert!(matches!(
            NodeId::from_encoded("not base64!"),
            Err(Error::InvalidNodeId(_))
        ));
    }

    #[test]
    fn test_node_id_serializes_as_text() {
        let id = NodeId::from_bytes("bar");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("YmFy"));

        let parsed: NodeId = serde_json::from_value(json!("YmFy")).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_value::<NodeId>(json!("%%")).is_err());
    }

    #[test]
    fn test_contact_parse_and_display() {
        let contact: Contact = "YmFy@127.0.0.1:11234".parse().unwrap();
        assert_eq!(contact.id, NodeId::from_bytes("bar"));
        assert_eq!(contact.host, "127.0.0.1");
        assert_eq!(contact.port, 11234);
        assert_eq!(contact.to_string(), "YmFy@127.0.0.1:11234");

        let v6: Contact = "YmFy@[::1]:6742".parse().unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.to_string(), "YmFy@[::1]:6742");
    }

    #[test]
    fn test_contact_parse_errors() {
        assert!("127.0.0.1:11234".parse::<Contact>().is_err());
        assert!("YmFy@127.0.0.1".parse::<Contact>().is_err());
        assert!("YmFy@127.0.0.1:0".parse::<Contact>().is_err());
        assert!("YmFy@127.0.0.1:70000".parse::<Contact>().is_err());
        assert!("YmFy@:6742".parse::<Contact>().is_err());
    }

    #[test]
    fn test_contact_validate() {
        let id = NodeId::from_bytes("bar");
        assert!(Contact::new(id.clone(), "localhost", 1).validate().is_ok());
        assert!(Contact::new(id.clone(), "localhost", 0).validate().is_err());
        assert!(Contact::new(id, "", 6742).validate().is_err());
    }

    #[test]
    fn test_sender_info_omits_absent_fields() {
        let sender = SenderInfo::with_id(NodeId::from_bytes("bar"));
        assert_eq!(serde_json::to_value(&sender).unwrap(), json!({"id": "YmFy"}));

        let contact = Contact::new(NodeId::from_bytes("bar"), "127.0.0.1", 11111);
        let sender = SenderInfo::from(&contact).with_data("bar");
        assert_eq!(
            serde_json::to_value(&sender).unwrap(),
            json!({"id": "YmFy", "host": "127.0.0.1", "port": 11111, "data": "bar"})
        );
    }
}

//! # Message Envelope
//!
//! The wire-level unit of communication between every actor attached to the
//! [`crate::network::NetworkCore`]. A `Message` is immutable once constructed:
//! the network core stamps an `id` on it at send time and never mutates it
//! again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node identifier. Cluster nodes use prefix `n` (`n1`), clients use prefix
/// `c` (`c1`), built-in services use their reserved name (`lin-kv`, `seq-kv`,
/// `lww-kv`, `lin-tso`), and the nemesis uses `:nemesis`. Assigned once at
/// test start and never reused.
pub type NodeId = String;

/// The direction a [`Message`] traveled, as recorded in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Recv,
}

/// An immutable envelope `{id, src, dest, body}`.
///
/// `body` is kept as a raw [`serde_json::Value`] object because workloads
/// extend the schema freely; the core only ever inspects the reserved keys
/// (`type`, `msg_id`, `in_reply_to`, `code`, `text`) and leaves everything
/// else untouched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Globally unique id assigned by the network core when the message
    /// enters the system. `0` until assigned.
    pub id: u64,
    pub src: NodeId,
    pub dest: NodeId,
    pub body: serde_json::Value,
}

impl Message {
    /// Construct a message with id `0`; the network core stamps the real id
    /// on `send`.
    pub fn new(src: impl Into<NodeId>, dest: impl Into<NodeId>, body: serde_json::Value) -> Self {
        Self {
            id: 0,
            src: src.into(),
            dest: dest.into(),
            body,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// The `body.type` field, or `"?"` if absent/non-string.
    pub fn body_type(&self) -> &str {
        self.body.get("type").and_then(|v| v.as_str()).unwrap_or("?")
    }

    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(|v| v.as_u64())
    }

    pub fn in_reply_to(&self) -> Option<u64> {
        self.body.get("in_reply_to").and_then(|v| v.as_u64())
    }

    /// Parse this message from a single line of the node wire protocol:
    /// `{"src":..,"dest":..,"body":{..}}`, with no `id` field (the core
    /// assigns one once the message is handed off as a send).
    pub fn from_wire_line(line: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Wire {
            src: NodeId,
            dest: NodeId,
            body: serde_json::Value,
        }
        let wire: Wire = serde_json::from_str(line)?;
        Ok(Self {
            id: 0,
            src: wire.src,
            dest: wire.dest,
            body: wire.body,
        })
    }

    /// Serialize as a single line suitable for writing to a node's stdin,
    /// without the internal `id` field (nodes never see it).
    pub fn to_wire_line(&self) -> String {
        serde_json::json!({
            "src": self.src,
            "dest": self.dest,
            "body": self.body,
        })
        .to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} -> {} [{}]",
            self.id,
            self.src,
            self.dest,
            self.body_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_format() {
        let line = r#"{"src":"c1","dest":"n1","body":{"type":"echo","msg_id":1,"echo":"hi"}}"#;
        let msg = Message::from_wire_line(line).unwrap();
        assert_eq!(msg.src, "c1");
        assert_eq!(msg.dest, "n1");
        assert_eq!(msg.body_type(), "echo");
        assert_eq!(msg.msg_id(), Some(1));

        let re_encoded = msg.to_wire_line();
        let reparsed = Message::from_wire_line(&re_encoded).unwrap();
        assert_eq!(msg.src, reparsed.src);
        assert_eq!(msg.dest, reparsed.dest);
        assert_eq!(msg.body, reparsed.body);
    }

    #[test]
    fn in_reply_to_absent_by_default() {
        let msg = Message::new("n1", "n2", serde_json::json!({"type": "read_ok"}));
        assert_eq!(msg.in_reply_to(), None);
    }
}

//! # Built-in Services
//!
//! Four virtual nodes — `lin-kv`, `seq-kv`, `lww-kv`, `lin-tso` — that attach
//! to the [`NetworkCore`] exactly like a user node, but execute in-process
//! rather than as a subprocess, each enforcing its own consistency
//! discipline.

mod lin_kv;
mod lin_tso;
mod lww_kv;
mod seq_kv;

pub use lin_kv::spawn_lin_kv;
pub use lin_tso::spawn_lin_tso;
pub use lww_kv::spawn_lww_kv;
pub use seq_kv::spawn_seq_kv;

use crate::error::MaelstromError;
use crate::message::Message;

/// The reserved names built-in services attach under.
pub const LIN_KV: &str = "lin-kv";
pub const SEQ_KV: &str = "seq-kv";
pub const LWW_KV: &str = "lww-kv";
pub const LIN_TSO: &str = "lin-tso";

pub(crate) fn reply_ok(req: &Message, mut body: serde_json::Value) -> Message {
    let in_reply_to = req.msg_id().unwrap_or(0);
    body["in_reply_to"] = serde_json::json!(in_reply_to);
    Message::new(req.dest.clone(), req.src.clone(), body)
}

pub(crate) fn reply_err(req: &Message, err: MaelstromError) -> Message {
    let in_reply_to = req.msg_id().unwrap_or(0);
    Message::new(req.dest.clone(), req.src.clone(), err.to_body(in_reply_to))
}

pub(crate) fn key_of(req: &Message) -> Result<serde_json::Value, MaelstromError> {
    req.body
        .get("key")
        .cloned()
        .ok_or_else(|| MaelstromError::malformed_request("missing key"))
}

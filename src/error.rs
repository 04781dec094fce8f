//! Wire-level error taxonomy shared between the network core, built-in
//! services and the workload driver.
//!
//! Application code is expected to work with `anyhow::Result` everywhere
//! except at the seam where an `error` body crosses the wire; there, the
//! `code`/`text`/definiteness triple is modeled explicitly so call sites can
//! match on `code` instead of string-sniffing.

use thiserror::Error;

/// A typed `error` body as defined by the reserved body shapes.
#[derive(Debug, Clone, Error)]
#[error("error {code}: {text}")]
pub struct MaelstromError {
    pub code: u32,
    pub text: String,
}

impl MaelstromError {
    pub fn new(code: u32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn node_does_not_exist(dest: &str) -> Self {
        Self::new(1, format!("node {dest} does not exist"))
    }

    pub fn not_supported(msg_type: &str) -> Self {
        Self::new(10, format!("no handler for message type {msg_type:?}"))
    }

    pub fn temporarily_unavailable(text: impl Into<String>) -> Self {
        Self::new(11, text.into())
    }

    pub fn malformed_request(text: impl Into<String>) -> Self {
        Self::new(12, text.into())
    }

    pub fn key_does_not_exist(key: &serde_json::Value) -> Self {
        Self::new(20, format!("key {key} does not exist"))
    }

    pub fn key_already_exists(key: &serde_json::Value) -> Self {
        Self::new(21, format!("key {key} already exists"))
    }

    pub fn precondition_failed(text: impl Into<String>) -> Self {
        Self::new(22, text.into())
    }

    pub fn txn_conflict(text: impl Into<String>) -> Self {
        Self::new(30, text.into())
    }

    pub fn timeout() -> Self {
        Self::new(0, "request timed out")
    }

    /// Whether this error is guaranteed not to have taken effect (`true`) or
    /// whether the operation's outcome is unknown (`false`).
    ///
    /// Codes 0 (timeout), 13 (crash) and 14 (abort) are indefinite; every
    /// other reserved code, and every workload-defined code (>= 100), is
    /// treated as definite unless the workload says otherwise.
    pub fn is_definite(&self) -> bool {
        !matches!(self.code, 0 | 13 | 14)
    }

    pub fn to_body(&self, in_reply_to: u64) -> serde_json::Value {
        serde_json::json!({
            "type": "error",
            "in_reply_to": in_reply_to,
            "code": self.code,
            "text": self.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definiteness_matches_taxonomy() {
        assert!(!MaelstromError::timeout().is_definite());
        assert!(!MaelstromError::new(13, "crash").is_definite());
        assert!(!MaelstromError::new(14, "abort").is_definite());
        assert!(MaelstromError::node_does_not_exist("n9").is_definite());
        assert!(MaelstromError::new(100, "workload defined").is_definite());
    }

    #[test]
    fn to_body_shape() {
        let err = MaelstromError::key_does_not_exist(&serde_json::json!("foo"));
        let body = err.to_body(42);
        assert_eq!(body["type"], "error");
        assert_eq!(body["in_reply_to"], 42);
        assert_eq!(body["code"], 20);
    }
}

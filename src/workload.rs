//! # Workload Contract
//!
//! The only seam the core exposes for adding a new workload: a generator
//! that produces the next abstract client operation, wire-format
//! encode/decode translators, a set of ops to run during the drain phase,
//! and a `check` that the test runner invokes once history is closed.
//!
//! The core ships two reference workloads — [`EchoWorkload`] and
//! [`LinKvWorkload`] — to exercise this plug-point end-to-end; the
//! catalog of "real" workloads (broadcast, g-set, pn-counter,
//! txn-list-append, …) is out of scope and would be added the same way:
//! implement [`Workload`] and register it in [`lookup`].

use crate::checker::{check_structural_invariants, CheckResult};
use crate::journal::OperationRecord;
use crate::message::NodeId;
use crate::services::LIN_KV;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// An abstract client operation: `f` names the operation, `value` carries
/// whatever shape that operation needs (a key, a `[key, value]` pair, …).
#[derive(Clone, Debug)]
pub struct Op {
    pub f: String,
    pub value: serde_json::Value,
}

impl Op {
    pub fn new(f: impl Into<String>, value: serde_json::Value) -> Self {
        Self { f: f.into(), value }
    }
}

/// A named bundle of generator + wire schema + checker. The test runner and
/// CLI never special-case a particular workload by name beyond looking up a
/// boxed instance from [`lookup`].
pub trait Workload: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the next op for the client with ordinal `client_ordinal`
    /// (0-based, stable for the client's lifetime). Mutates no shared state;
    /// per-client randomness is threaded through `rng` rather than a
    /// returned "next state" value, which is the idiomatic substitute for a
    /// pure `(op, next_state)` pair in a language with an RNG handle instead
    /// of an explicit seed-carrying state monad (see DESIGN.md).
    fn next_op(&self, client_ordinal: usize, rng: &mut dyn rand::RngCore) -> Op;

    /// Which node a request should be addressed to. Defaults to round-robin
    /// over `nodes`; a workload bound to a single built-in service overrides
    /// this to always return that service's name.
    fn target(&self, client_ordinal: usize, op_index: u64, nodes: &[NodeId]) -> NodeId {
        let _ = client_ordinal;
        nodes[(op_index as usize) % nodes.len()].clone()
    }

    /// Translate an abstract op into the request body placed on the wire,
    /// with `msg_id` already stamped by the caller.
    fn encode(&self, msg_id: u64, op: &Op) -> serde_json::Value;

    /// Translate a successful reply body back into the `value` recorded in
    /// the history's `ok` record.
    fn decode_ok(&self, op: &Op, reply_body: &serde_json::Value) -> serde_json::Value;

    /// Ops to run once during the drain phase (e.g. a final read of every
    /// key). Default: none.
    fn final_ops(&self, _nodes: &[NodeId]) -> Vec<Op> {
        Vec::new()
    }

    /// Invoked once history is closed. The shipped workloads only run the
    /// structural baseline from [`crate::checker`]; a deeper consistency
    /// checker (linearizability model-checking, dependency-graph safety) is
    /// a plug-point a workload can call into here instead.
    fn check(&self, history: &[OperationRecord]) -> CheckResult {
        check_structural_invariants(history)
    }
}

/// `echo`: the client sends `{type:"echo", echo:<value>}` to a cluster node
/// and expects `{type:"echo_ok", echo:<same value>}` back. No built-in
/// service involvement; exercises the core plug-point with the simplest
/// possible wire schema.
pub struct EchoWorkload {
    next_payload: AtomicU64,
}

impl EchoWorkload {
    pub fn new() -> Self {
        Self {
            next_payload: AtomicU64::new(0),
        }
    }
}

impl Default for EchoWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for EchoWorkload {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn next_op(&self, _client_ordinal: usize, _rng: &mut dyn rand::RngCore) -> Op {
        let n = self.next_payload.fetch_add(1, Ordering::Relaxed);
        Op::new("echo", serde_json::json!(format!("echo-payload-{n}")))
    }

    fn encode(&self, msg_id: u64, op: &Op) -> serde_json::Value {
        serde_json::json!({
            "type": "echo",
            "msg_id": msg_id,
            "echo": op.value,
        })
    }

    fn decode_ok(&self, _op: &Op, reply_body: &serde_json::Value) -> serde_json::Value {
        reply_body.get("echo").cloned().unwrap_or(serde_json::Value::Null)
    }
}

/// `lin-kv`: drives the built-in `lin-kv` service directly (rather than a
/// user cluster node) with a small fixed keyspace, issuing `read`/`write`/
/// `cas` uniformly at random. `final_ops` reads every key once during drain
/// so the checker can observe the converged state.
pub struct LinKvWorkload {
    keys: Vec<serde_json::Value>,
}

impl LinKvWorkload {
    pub fn new(key_count: usize) -> Self {
        Self {
            keys: (0..key_count).map(|k| serde_json::json!(format!("k{k}"))).collect(),
        }
    }
}

impl Default for LinKvWorkload {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Workload for LinKvWorkload {
    fn name(&self) -> &'static str {
        "lin-kv"
    }

    fn next_op(&self, _client_ordinal: usize, rng: &mut dyn rand::RngCore) -> Op {
        let key = self.keys[rng.gen_range(0..self.keys.len())].clone();
        match rng.gen_range(0..3) {
            0 => Op::new("read", serde_json::json!({ "key": key })),
            1 => {
                let value = rng.gen_range(0..100);
                Op::new("write", serde_json::json!({ "key": key, "value": value }))
            }
            _ => {
                let from = rng.gen_range(0..100);
                let to = rng.gen_range(0..100);
                Op::new(
                    "cas",
                    serde_json::json!({ "key": key, "from": from, "to": to, "create_if_not_exists": true }),
                )
            }
        }
    }

    fn target(&self, _client_ordinal: usize, _op_index: u64, _nodes: &[NodeId]) -> NodeId {
        LIN_KV.to_string()
    }

    fn encode(&self, msg_id: u64, op: &Op) -> serde_json::Value {
        let mut body = op.value.clone();
        body["type"] = serde_json::json!(op.f);
        body["msg_id"] = serde_json::json!(msg_id);
        body
    }

    fn decode_ok(&self, op: &Op, reply_body: &serde_json::Value) -> serde_json::Value {
        match op.f.as_str() {
            "read" => reply_body.get("value").cloned().unwrap_or(serde_json::Value::Null),
            _ => serde_json::json!(true),
        }
    }

    fn final_ops(&self, _nodes: &[NodeId]) -> Vec<Op> {
        self.keys
            .iter()
            .map(|key| Op::new("read", serde_json::json!({ "key": key })))
            .collect()
    }
}

/// Look up a workload by its `--workload` CLI name. Returns `None` for an
/// unrecognized name, which the CLI surfaces as a usage error (exit 3).
pub fn lookup(name: &str) -> Option<Box<dyn Workload>> {
    match name {
        "echo" => Some(Box::new(EchoWorkload::new())),
        "lin-kv" => Some(Box::new(LinKvWorkload::default())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn echo_round_trips_its_payload() {
        let workload = EchoWorkload::new();
        let mut rng = StdRng::seed_from_u64(0);
        let op = workload.next_op(0, &mut rng);
        let body = workload.encode(1, &op);
        assert_eq!(body["type"], "echo");
        let decoded = workload.decode_ok(&op, &serde_json::json!({"type": "echo_ok", "echo": op.value}));
        assert_eq!(decoded, op.value);
    }

    #[test]
    fn lin_kv_targets_the_service_directly() {
        let workload = LinKvWorkload::default();
        let nodes = vec!["n1".to_string(), "n2".to_string()];
        assert_eq!(workload.target(0, 0, &nodes), LIN_KV);
    }

    #[test]
    fn lookup_rejects_unknown_names() {
        assert!(lookup("does-not-exist").is_none());
        assert!(lookup("echo").is_some());
    }
}

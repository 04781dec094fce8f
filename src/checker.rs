//! # Consistency Checkers (minimal structural layer)
//!
//! Deep consistency algorithms (linearizability via model execution,
//! transactional safety via dependency graphs) are a separate catalog the
//! core only invokes through this seam; what ships here is the structural
//! baseline every workload's own checker composes with: the universal
//! invariants in the testable-properties section hold regardless of which
//! workload or safety property is under test.

use crate::journal::{JournalEntry, OpKind, OperationRecord};
use std::collections::{HashMap, HashSet};

/// The verdict the test runner assembles into its result bundle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub anomalies: Vec<String>,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            anomalies: Vec::new(),
        }
    }

    pub fn merge(mut self, other: CheckResult) -> Self {
        self.anomalies.extend(other.anomalies);
        self.valid = self.valid && other.valid;
        self
    }
}

/// Invoked by the test runner with `(history, workload-config)`; a
/// workload's own `check` (see [`crate::workload::Workload::check`]) is one
/// implementation of this seam, but nothing requires the two to coincide —
/// a future linearizability checker could be layered on top the same way.
pub trait Checker: Send + Sync {
    fn check(&self, history: &[OperationRecord]) -> CheckResult;
}

/// Verifies the universal invariants from the testable-properties section
/// that hold independent of any particular workload:
/// - each process's records alternate invoke, then exactly one of ok/fail/info
/// - `msg_id` uniqueness is the workload driver's responsibility upstream and
///   is not re-derived here since the history does not carry raw `msg_id`s
pub fn check_structural_invariants(history: &[OperationRecord]) -> CheckResult {
    let mut anomalies = Vec::new();
    let mut outstanding: HashMap<&str, bool> = HashMap::new();

    for record in history {
        let has_outstanding = *outstanding.get(record.process.as_str()).unwrap_or(&false);
        match record.kind {
            OpKind::Invoke => {
                if has_outstanding {
                    anomalies.push(format!(
                        "process {} issued invoke at index {} while a prior invoke was still outstanding",
                        record.process, record.index
                    ));
                }
                outstanding.insert(record.process.as_str(), true);
            }
            OpKind::Ok | OpKind::Fail | OpKind::Info => {
                if !has_outstanding {
                    anomalies.push(format!(
                        "process {} has a completion at index {} with no matching invoke",
                        record.process, record.index
                    ));
                }
                outstanding.insert(record.process.as_str(), false);
            }
        }
    }

    CheckResult {
        valid: anomalies.is_empty(),
        anomalies,
    }
}

/// For all messages M in the journal: if a `recv` event for M exists, a
/// `send` event for M precedes it in linear time and `recv.time >=
/// send.time`. Used by the result aggregator's stats block and by tests;
/// a violation here indicates a core invariant violation (bug in
/// Maelstrom itself), not a workload failure.
pub fn check_journal_causality(journal: &[JournalEntry]) -> CheckResult {
    let mut sent: HashMap<u64, u64> = HashMap::new();
    let mut anomalies = Vec::new();

    for entry in journal {
        match entry.direction {
            crate::message::Direction::Send => {
                sent.insert(entry.message.id, entry.time_ns);
            }
            crate::message::Direction::Recv => match sent.get(&entry.message.id) {
                Some(send_time) if *send_time <= entry.time_ns => {}
                Some(send_time) => anomalies.push(format!(
                    "message {} delivered at {} before it was sent at {}",
                    entry.message.id, entry.time_ns, send_time
                )),
                None => anomalies.push(format!("message {} delivered with no prior send event", entry.message.id)),
            },
        }
    }

    CheckResult {
        valid: anomalies.is_empty(),
        anomalies,
    }
}

/// `msg_id` uniqueness: for every node and every `msg_id`, the number of
/// messages from that node with that `msg_id` is at most one.
pub fn check_msg_id_uniqueness(journal: &[JournalEntry]) -> CheckResult {
    let mut seen: HashSet<(String, u64)> = HashSet::new();
    let mut anomalies = Vec::new();
    for entry in journal {
        if entry.direction != crate::message::Direction::Send {
            continue;
        }
        if let Some(msg_id) = entry.message.msg_id() {
            let key = (entry.message.src.clone(), msg_id);
            if !seen.insert(key) {
                anomalies.push(format!(
                    "node {} reused msg_id {} across multiple sends",
                    entry.message.src, msg_id
                ));
            }
        }
    }
    CheckResult {
        valid: anomalies.is_empty(),
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::History;

    #[test]
    fn detects_missing_invoke() {
        let history = History::new();
        history.append("c1", 0, OpKind::Ok, "read", serde_json::json!(null));
        let result = check_structural_invariants(&history.snapshot());
        assert!(!result.valid);
        assert_eq!(result.anomalies.len(), 1);
    }

    #[test]
    fn well_formed_history_is_valid() {
        let history = History::new();
        history.append("c1", 0, OpKind::Invoke, "read", serde_json::json!(null));
        history.append("c1", 1, OpKind::Ok, "read", serde_json::json!(1));
        let result = check_structural_invariants(&history.snapshot());
        assert!(result.valid);
    }
}

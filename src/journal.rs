//! # Journal and History
//!
//! Two append-only, single-writer logs:
//!
//! - The [`Journal`] records every `send`/`recv` network event, written
//!   exclusively by the network core, in the exact order it observed them
//!   (journal order equals linear time).
//! - The [`History`] records the client-visible operation sequence, written
//!   exclusively by the workload driver, in append order.
//!
//! Both are modeled as a single actor owning a growable vector behind a
//! mutex rather than a shared atom with compare-and-swap retries: every
//! writer is already serialized by construction (one network core, one
//! workload driver), so the mutex is never contended across distinct
//! logical writers, only across concurrent clients within the driver.

use crate::message::{Direction, Message};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One entry in the [`Journal`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub time_ns: u64,
    pub direction: Direction,
    pub message: Message,
}

/// Append-only log of every send and successful recv the network core has
/// observed, used by checkers and the Lamport-diagram plotter.
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, time_ns: u64, direction: Direction, message: Message) {
        self.entries.lock().unwrap().push(JournalEntry {
            time_ns,
            direction,
            message,
        });
    }

    pub fn snapshot(&self) -> Vec<JournalEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The kind of an [`OperationRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Invoke,
    Ok,
    Fail,
    Info,
}

/// `{index, process, time_ns, type, f, value}` as defined by the data model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationRecord {
    pub index: u64,
    /// The logical process this record belongs to (a client ordinal, or a
    /// sentinel used for the `:nemesis` pseudo-process).
    pub process: String,
    pub time_ns: u64,
    #[serde(rename = "type")]
    pub kind: OpKind,
    pub f: String,
    pub value: serde_json::Value,
}

/// Ordered, append-only sequence of operation records. For each `process`,
/// the sequence of its own records alternates `invoke, (ok|fail|info), ...`
/// — enforced by construction in [`crate::client::ClientActor`], not by this
/// type, since enforcing it here would require tracking per-process state
/// the history itself has no business owning.
#[derive(Default)]
pub struct History {
    records: Mutex<Vec<OperationRecord>>,
    next_index: Mutex<u64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, process: impl Into<String>, time_ns: u64, kind: OpKind, f: impl Into<String>, value: serde_json::Value) -> u64 {
        let mut next_index = self.next_index.lock().unwrap();
        let index = *next_index;
        *next_index += 1;
        drop(next_index);

        self.records.lock().unwrap().push(OperationRecord {
            index,
            process: process.into(),
            time_ns,
            kind,
            f: f.into(),
            value,
        });
        index
    }

    pub fn snapshot(&self) -> Vec<OperationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_preserves_append_order() {
        let journal = Journal::new();
        journal.append(0, Direction::Send, Message::new("n1", "n2", serde_json::json!({})));
        journal.append(5, Direction::Recv, Message::new("n1", "n2", serde_json::json!({})));
        let snapshot = journal.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].direction, Direction::Send);
        assert_eq!(snapshot[1].direction, Direction::Recv);
    }

    #[test]
    fn history_indexes_are_monotonic() {
        let history = History::new();
        let i0 = history.append("c1", 0, OpKind::Invoke, "read", serde_json::json!(null));
        let i1 = history.append("c2", 1, OpKind::Invoke, "read", serde_json::json!(null));
        assert!(i1 > i0);
        assert_eq!(history.len(), 2);
    }
}

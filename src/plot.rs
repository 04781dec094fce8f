//! # Plotting & Visualization
//!
//! Two report artifacts rendered from a finished run's journal and history:
//! a Lamport diagram (one horizontal lane per node, an arrow per message from
//! its send point to its recv point) and a latency histogram over completed
//! operations. Both are one-shot renders over already-closed data, not a
//! live view, so there's no need for anything beyond `plotters`' static
//! chart-building API.

use crate::journal::{JournalEntry, OperationRecord};
use crate::message::{Direction, NodeId};
use anyhow::{Context, Result};
use plotters::prelude::*;
use std::collections::HashMap;
use std::path::Path;

/// Implemented by each report artifact the test runner emits after a run.
/// Kept as a trait rather than two unrelated functions so the runner can
/// hold a `Vec<Box<dyn Plotter>>` and fold a "best effort" rendering pass
/// into one loop — a failed render (e.g. an empty journal) is logged and
/// skipped rather than failing the whole test.
pub trait Plotter {
    fn render(&self, journal: &[JournalEntry], history: &[OperationRecord], out_path: &Path) -> Result<()>;
}

/// Renders `messages.svg`: one lane per node ordered by first appearance,
/// one line segment per journaled message from its send instant to its
/// recv instant. Messages with no recv event (dropped, or still in flight
/// at teardown) are omitted — there is no second endpoint to draw.
pub struct LamportPlotter;

impl Plotter for LamportPlotter {
    fn render(&self, journal: &[JournalEntry], _history: &[OperationRecord], out_path: &Path) -> Result<()> {
        if journal.is_empty() {
            anyhow::bail!("empty journal, nothing to plot");
        }

        let mut lanes: Vec<NodeId> = Vec::new();
        let mut lane_of: HashMap<NodeId, usize> = HashMap::new();
        let mut sends: HashMap<u64, &JournalEntry> = HashMap::new();
        let mut edges: Vec<(&JournalEntry, &JournalEntry)> = Vec::new();

        for entry in journal {
            for node in [&entry.message.src, &entry.message.dest] {
                if !lane_of.contains_key(node) {
                    lane_of.insert(node.clone(), lanes.len());
                    lanes.push(node.clone());
                }
            }
            match entry.direction {
                Direction::Send => {
                    sends.insert(entry.message.id, entry);
                }
                Direction::Recv => {
                    if let Some(send_entry) = sends.get(&entry.message.id) {
                        edges.push((send_entry, entry));
                    }
                }
            }
        }

        let max_time_ns = journal.iter().map(|e| e.time_ns).max().unwrap_or(1).max(1);
        let lane_count = lanes.len().max(1);

        let root = SVGBackend::new(out_path, (1200, 120 + 40 * lane_count as u32)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("message delivery timeline", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(80)
            .build_cartesian_2d(0f64..max_time_ns as f64, 0f64..lane_count as f64)
            .context("building Lamport chart coordinate system")?;

        chart
            .configure_mesh()
            .y_labels(lane_count)
            .y_label_formatter(&|y| {
                let idx = *y as usize;
                lanes.get(idx).cloned().unwrap_or_default()
            })
            .x_desc("time (ns)")
            .draw()
            .context("drawing chart mesh")?;

        for (send_entry, recv_entry) in &edges {
            let src_lane = *lane_of.get(&send_entry.message.src).unwrap_or(&0) as f64 + 0.5;
            let dest_lane = *lane_of.get(&recv_entry.message.dest).unwrap_or(&0) as f64 + 0.5;
            chart
                .draw_series(LineSeries::new(
                    [(send_entry.time_ns as f64, src_lane), (recv_entry.time_ns as f64, dest_lane)],
                    &BLUE.mix(0.4),
                ))
                .context("drawing message edge")?;
        }

        root.present().context("flushing Lamport diagram to disk")?;
        Ok(())
    }
}

/// Renders `latency-raw.png`: a histogram of per-operation completion
/// latency (invoke -> ok/fail/info), derived directly from history rather
/// than from the hdrhistogram collectors, since by report time those have
/// already been folded down to percentiles and the raw samples are gone.
pub struct LatencyHistogramPlotter;

impl Plotter for LatencyHistogramPlotter {
    fn render(&self, _journal: &[JournalEntry], history: &[OperationRecord], out_path: &Path) -> Result<()> {
        let latencies_ms = completion_latencies_ms(history);
        if latencies_ms.is_empty() {
            anyhow::bail!("no completed operations, nothing to plot");
        }

        let max_ms = latencies_ms.iter().cloned().fold(0f64, f64::max).max(1.0);
        let bucket_count = 30usize;
        let bucket_width = max_ms / bucket_count as f64;
        let mut buckets = vec![0u32; bucket_count];
        for &latency in &latencies_ms {
            let idx = ((latency / bucket_width) as usize).min(bucket_count - 1);
            buckets[idx] += 1;
        }
        let max_count = buckets.iter().cloned().max().unwrap_or(1);

        let root = BitMapBackend::new(out_path, (900, 500)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("operation latency distribution", ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(0f64..max_ms, 0u32..max_count + 1)
            .context("building latency histogram coordinate system")?;

        chart
            .configure_mesh()
            .x_desc("latency (ms)")
            .y_desc("operations")
            .draw()
            .context("drawing chart mesh")?;

        chart
            .draw_series(buckets.iter().enumerate().map(|(i, &count)| {
                let x0 = i as f64 * bucket_width;
                let x1 = x0 + bucket_width;
                Rectangle::new([(x0, 0), (x1, count)], BLUE.filled())
            }))
            .context("drawing histogram bars")?;

        root.present().context("flushing latency histogram to disk")?;
        Ok(())
    }
}

/// Pairs each process's `invoke` with its following completion and returns
/// the elapsed time in milliseconds. Mirrors the alternation invariant the
/// structural checker already enforces, so a malformed history just yields
/// fewer samples rather than panicking.
fn completion_latencies_ms(history: &[OperationRecord]) -> Vec<f64> {
    use crate::journal::OpKind;
    let mut pending: HashMap<&str, u64> = HashMap::new();
    let mut latencies = Vec::new();
    for record in history {
        match record.kind {
            OpKind::Invoke => {
                pending.insert(record.process.as_str(), record.time_ns);
            }
            OpKind::Ok | OpKind::Fail | OpKind::Info => {
                if let Some(invoke_ns) = pending.remove(record.process.as_str()) {
                    let elapsed_ns = record.time_ns.saturating_sub(invoke_ns);
                    latencies.push(elapsed_ns as f64 / 1_000_000.0);
                }
            }
        }
    }
    latencies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{History, Journal, OpKind};
    use crate::message::{Direction, Message};
    use tempfile::tempdir;

    #[test]
    fn lamport_plotter_renders_svg_for_nonempty_journal() {
        let journal = Journal::new();
        journal.append(0, Direction::Send, Message::new("n1", "n2", serde_json::json!({"type": "echo"})));
        journal.append(5, Direction::Recv, Message::new("n1", "n2", serde_json::json!({"type": "echo"})));

        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.svg");
        LamportPlotter.render(&journal.snapshot(), &[], &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn latency_histogram_renders_png_for_completed_ops() {
        let history = History::new();
        history.append("c1", 0, OpKind::Invoke, "read", serde_json::json!(null));
        history.append("c1", 10_000_000, OpKind::Ok, "read", serde_json::json!(1));

        let dir = tempdir().unwrap();
        let path = dir.path().join("latency-raw.png");
        LatencyHistogramPlotter.render(&[], &history.snapshot(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn empty_inputs_are_rejected_rather_than_producing_blank_images() {
        let dir = tempdir().unwrap();
        assert!(LamportPlotter.render(&[], &[], &dir.path().join("messages.svg")).is_err());
        assert!(LatencyHistogramPlotter.render(&[], &[], &dir.path().join("latency-raw.png")).is_err());
    }
}

//! # Result Aggregation & Persistence
//!
//! Folds a finished run's checker verdict, network stats and latency
//! distribution into one `results.json`, writes the raw `history.json` and
//! `journal.json` alongside it plus the two plotted artifacts, and prints
//! the user-visible verdict the error-handling design calls for: `valid?`,
//! the anomaly list, and the stats block.

use crate::checker::CheckResult;
use crate::journal::{JournalEntry, OperationRecord};
use crate::metrics::{LatencySummary, NetworkStats};
use crate::plot::{LamportPlotter, LatencyHistogramPlotter, Plotter};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// The exact shape written to `results.json`.
#[derive(Debug, Serialize)]
pub struct ResultsSummary {
    pub workload: String,
    pub seed: u64,
    pub valid: bool,
    pub anomalies: Vec<String>,
    pub stats: NetworkStats,
    pub latency: LatencySummary,
}

/// Everything the test runner hands off to persistence and reporting, owned
/// together since both draw from the same closed-out run.
pub struct ResultBundle {
    pub workload: String,
    pub seed: u64,
    pub check: CheckResult,
    pub history: Vec<OperationRecord>,
    pub journal: Vec<JournalEntry>,
    pub latency: LatencySummary,
    pub network_stats: NetworkStats,
}

impl ResultBundle {
    pub fn summary(&self) -> ResultsSummary {
        ResultsSummary {
            workload: self.workload.clone(),
            seed: self.seed,
            valid: self.check.valid,
            anomalies: self.check.anomalies.clone(),
            stats: self.network_stats.clone(),
            latency: self.latency.clone(),
        }
    }

    /// Write the full persisted-state layout under
    /// `store_dir/<workload>/<unix-ts>-<short-seed>-<uuid>/` and re-point
    /// `store_dir/<workload>/latest` at it. Returns the run directory. The
    /// trailing `uuid` component guards against two runs with the same seed
    /// landing in the same wall-clock second and colliding on directory
    /// name, which the timestamp+seed pair alone does not rule out.
    /// Plot rendering failures (e.g. an empty journal) are logged and
    /// skipped rather than failing the whole persistence step — the JSON
    /// artifacts are the ones the checker and any tooling actually depend
    /// on, the plots are a diagnostic convenience.
    pub fn persist(&self, store_dir: &Path) -> Result<PathBuf> {
        let run_dir_name = format!("{}-{:x}-{}", unix_timestamp(), self.seed, short_uuid());
        let workload_dir = store_dir.join(&self.workload);
        let run_dir = workload_dir.join(&run_dir_name);
        fs::create_dir_all(&run_dir).with_context(|| format!("creating run directory {run_dir:?}"))?;

        write_json(&run_dir.join("history.json"), &self.history)?;
        write_json(&run_dir.join("journal.json"), &self.journal)?;
        write_json(&run_dir.join("results.json"), &self.summary())?;

        if let Err(e) = LamportPlotter.render(&self.journal, &self.history, &run_dir.join("messages.svg")) {
            warn!(error = %e, "skipping Lamport diagram");
        }
        if let Err(e) = LatencyHistogramPlotter.render(&self.journal, &self.history, &run_dir.join("latency-raw.png")) {
            warn!(error = %e, "skipping latency histogram");
        }

        update_latest_alias(&workload_dir, &run_dir)?;
        Ok(run_dir)
    }

    /// Print the structured verdict: `valid? true/false`, the anomaly list
    /// if invalid, and the stats block. Matches the console-output half of
    /// the error-handling design's "user-visible failure" contract; the
    /// persisted `results.json` carries the same data for tooling.
    pub fn print_verdict(&self) {
        if self.check.valid {
            println!("{} workload {}", "valid? true".green().bold(), self.workload);
        } else {
            println!("{} workload {}", "valid? false".red().bold(), self.workload);
            for anomaly in &self.check.anomalies {
                println!("  {} {anomaly}", "anomaly:".yellow());
            }
        }
        println!(
            "stats: sent={} recv={} ops={} msgs/op={:.2}",
            self.network_stats.messages_sent,
            self.network_stats.messages_received,
            self.network_stats.ops_completed,
            self.network_stats.messages_per_op(),
        );
        if self.latency.samples > 0 {
            print!(
                "latency: samples={} min={}ns max={}ns mean={:.0}ns",
                self.latency.samples, self.latency.min_ns, self.latency.max_ns, self.latency.mean_ns
            );
            for p in &self.latency.percentiles {
                print!(" p{}={}ns", p.percentile, p.value_ns);
            }
            println!();
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {path:?}"))?;
    serde_json::to_writer_pretty(file, value).with_context(|| format!("writing {path:?}"))?;
    Ok(())
}

fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// The first 8 hex characters of a fresh v4 UUID, enough entropy to
/// disambiguate two runs persisted within the same second.
fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Re-create `<workload_dir>/latest` pointing at `run_dir`. On unix this is
/// a symlink per the layout spec; elsewhere (no symlink support) it falls
/// back to a directory holding a copy of `results.json` annotated with a
/// `latest_run_dir` pointer.
#[cfg(unix)]
fn update_latest_alias(workload_dir: &Path, run_dir: &Path) -> Result<()> {
    let latest = workload_dir.join("latest");
    let _ = fs::remove_file(&latest);
    let _ = fs::remove_dir_all(&latest);
    std::os::unix::fs::symlink(run_dir, &latest).with_context(|| format!("symlinking {latest:?} -> {run_dir:?}"))
}

#[cfg(not(unix))]
fn update_latest_alias(workload_dir: &Path, run_dir: &Path) -> Result<()> {
    let latest_dir = workload_dir.join("latest");
    fs::create_dir_all(&latest_dir)?;
    let results_src = run_dir.join("results.json");
    let mut value: serde_json::Value = serde_json::from_reader(fs::File::open(&results_src)?)?;
    value["latest_run_dir"] = serde_json::json!(run_dir);
    write_json(&latest_dir.join("results.json"), &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckResult;
    use crate::metrics::PercentileValue;
    use tempfile::tempdir;

    fn sample_bundle() -> ResultBundle {
        ResultBundle {
            workload: "echo".to_string(),
            seed: 7,
            check: CheckResult::ok(),
            history: Vec::new(),
            journal: Vec::new(),
            latency: LatencySummary {
                samples: 1,
                min_ns: 100,
                max_ns: 100,
                mean_ns: 100.0,
                percentiles: vec![PercentileValue { percentile: 50.0, value_ns: 100 }],
            },
            network_stats: NetworkStats::default(),
        }
    }

    #[test]
    fn persist_writes_json_artifacts_and_latest_alias() {
        let dir = tempdir().unwrap();
        let bundle = sample_bundle();
        let run_dir = bundle.persist(dir.path()).unwrap();

        assert!(run_dir.join("history.json").exists());
        assert!(run_dir.join("journal.json").exists());
        assert!(run_dir.join("results.json").exists());

        let latest = dir.path().join("echo").join("latest");
        assert!(latest.exists());
    }

    #[test]
    fn persist_twice_with_the_same_seed_does_not_collide() {
        let dir = tempdir().unwrap();
        let run_dir_a = sample_bundle().persist(dir.path()).unwrap();
        let run_dir_b = sample_bundle().persist(dir.path()).unwrap();
        assert_ne!(run_dir_a, run_dir_b);
        assert!(run_dir_a.exists());
        assert!(run_dir_b.exists());
    }

    #[test]
    fn summary_round_trips_through_serde() {
        let bundle = sample_bundle();
        let summary = bundle.summary();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"valid\":true"));
    }
}

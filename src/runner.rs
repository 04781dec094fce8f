//! # Test Runner
//!
//! Composes every other component into one lifecycle: setup (clock, network,
//! services, node supervisors, init handshake), concurrent load generation
//! and fault injection until the time limit, a quiet drain period, teardown,
//! checking, and result aggregation. This is the one place that owns every
//! actor for the run's duration — everything else is a library the runner
//! wires together.

use crate::checker::CheckResult;
use crate::client::{run_final_ops, ClientActor, ClientConfig};
use crate::clock::{Clock, RealClock, VirtualClock};
use crate::init;
use crate::journal::{History, Journal, JournalEntry, OperationRecord};
use crate::metrics::{representative_summary, LatencyCollector, LatencySummary, NetworkStats};
use crate::message::{Direction, NodeId};
use crate::nemesis::{run_nemesis, NemesisConfig, NemesisKind};
use crate::network::{NetworkConfig, NetworkCore};
use crate::node::NodeSupervisor;
use crate::services;
use crate::workload::Workload;
use anyhow::{ensure, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Everything the CLI's `test` subcommand collects before the runner takes
/// over. Field names mirror the CLI flags 1:1.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub bin_path: PathBuf,
    pub workload_name: String,
    pub node_ids: Vec<NodeId>,
    pub concurrency: usize,
    pub rate: Option<f64>,
    pub time_limit: Duration,
    pub latency_mean_ms: u32,
    pub latency_jitter_ms: u32,
    pub nemesis: NemesisKind,
    pub faults_interval: Duration,
    pub timeout: Duration,
    pub init_timeout: Duration,
    pub seed: u64,
    pub percentiles: Vec<f64>,
    pub virtual_clock: bool,
    pub log_dir: PathBuf,
    pub log_stderr: bool,
}

/// Everything the result aggregator and CLI verdict printer need.
pub struct RunOutcome {
    pub check: CheckResult,
    pub history: Vec<OperationRecord>,
    pub journal: Vec<JournalEntry>,
    pub latency: LatencySummary,
    pub network_stats: NetworkStats,
}

pub async fn run_test(config: RunConfig) -> Result<RunOutcome> {
    ensure!(!config.node_ids.is_empty(), "node-count must be at least 1");
    ensure!(config.concurrency > 0, "concurrency must be at least 1");
    ensure!(
        config.bin_path.exists(),
        "node binary {:?} does not exist",
        config.bin_path
    );

    let workload: Arc<dyn Workload> =
        Arc::from(crate::workload::lookup(&config.workload_name).with_context(|| format!("unknown workload {:?}", config.workload_name))?);

    let clock: Arc<dyn Clock> = if config.virtual_clock {
        Arc::new(VirtualClock::new())
    } else {
        Arc::new(RealClock::new())
    };
    let journal = Arc::new(Journal::new());
    let network = NetworkCore::new(
        clock.clone(),
        journal.clone(),
        NetworkConfig {
            latency_mean_ms: config.latency_mean_ms,
            latency_jitter_ms: config.latency_jitter_ms,
            seed: config.seed,
        },
    );
    let history = Arc::new(History::new());
    let (stop_tx, stop_rx) = watch::channel(false);

    let pump = network.clone().spawn_pump();
    let _lin_kv = services::spawn_lin_kv(network.clone());
    let _seq_kv = services::spawn_seq_kv(network.clone());
    let _lww_kv = services::spawn_lww_kv(network.clone(), clock.clone());
    let _lin_tso = services::spawn_lin_tso(network.clone());

    let node_ids = config.node_ids.clone();
    let mut supervisors = Vec::with_capacity(node_ids.len());
    for node_id in &node_ids {
        let log_path = config.log_dir.join(format!("node-{node_id}.log"));
        let supervisor = NodeSupervisor::with_stderr_logging(node_id.clone(), config.bin_path.clone(), log_path, config.log_stderr);
        supervisor
            .spawn(network.clone())
            .await
            .with_context(|| format!("spawning node {node_id}"))?;
        supervisors.push(supervisor);
    }

    for node_id in &node_ids {
        init::initialize_node(&network, node_id, &node_ids, config.init_timeout)
            .await
            .with_context(|| format!("init handshake with node {node_id}"))?;
    }
    info!(nodes = node_ids.len(), workload = %config.workload_name, "setup complete, starting load");

    let nemesis_handle = {
        let nemesis_config = NemesisConfig {
            kind: config.nemesis,
            interval: config.faults_interval,
            init_timeout: config.init_timeout,
        };
        tokio::spawn(run_nemesis(
            network.clone(),
            clock.clone(),
            history.clone(),
            supervisors.clone(),
            node_ids.clone(),
            nemesis_config,
            config.seed.wrapping_add(1),
            stop_rx.clone(),
        ))
    };

    let per_client_interval = config
        .rate
        .filter(|r| *r > 0.0)
        .map(|rate| Duration::from_secs_f64(config.concurrency as f64 / rate));

    let mut client_handles = Vec::with_capacity(config.concurrency);
    for ordinal in 0..config.concurrency {
        let client_id = format!("c{ordinal}");
        let inbox = network.attach(client_id.clone()).await;
        let client_config = ClientConfig {
            timeout: config.timeout,
            interval: per_client_interval,
        };
        let client = ClientActor::new(
            client_id,
            ordinal,
            network.clone(),
            clock.clone(),
            history.clone(),
            workload.clone(),
            node_ids.clone(),
            client_config,
            config.seed.wrapping_add(2).wrapping_add(ordinal as u64),
        );
        client_handles.push(tokio::spawn(client.run(inbox, stop_rx.clone())));
    }

    let deadline_ns = clock.now_ns() + config.time_limit.as_nanos() as u64;
    network.schedule_timer(deadline_ns).await.await.ok();
    stop_tx.send(true).ok();
    info!("time limit reached, draining load generators");

    let mut collectors = Vec::with_capacity(client_handles.len());
    for handle in client_handles {
        collectors.push(handle.await.context("client task panicked")?);
    }
    nemesis_handle.await.context("nemesis task panicked")?;

    network.heal_all().await;
    for supervisor in &supervisors {
        let _ = supervisor.resume().await;
    }
    info!("draining: network healed, running final ops");
    run_final_ops(network.clone(), clock.clone(), history.clone(), workload.clone(), node_ids.clone(), config.timeout).await;

    for supervisor in &supervisors {
        if let Err(e) = supervisor.teardown(Duration::from_secs(2)).await {
            warn!(node = supervisor.node_id(), error = %e, "error tearing down node");
        }
    }

    pump.abort();

    let history_snapshot = history.snapshot();
    let journal_snapshot = journal.snapshot();

    let workload_check = workload.check(&history_snapshot);
    let causality_check = crate::checker::check_journal_causality(&journal_snapshot);
    let msg_id_check = crate::checker::check_msg_id_uniqueness(&journal_snapshot);
    let check = workload_check.merge(causality_check).merge(msg_id_check);

    let latency = representative_summary(&collectors, &config.percentiles);
    let network_stats = compute_network_stats(&journal_snapshot, &history_snapshot);

    info!(valid = check.valid, anomalies = check.anomalies.len(), "test run complete");

    Ok(RunOutcome {
        check,
        history: history_snapshot,
        journal: journal_snapshot,
        latency,
        network_stats,
    })
}

fn compute_network_stats(journal: &[JournalEntry], history: &[OperationRecord]) -> NetworkStats {
    let mut sent = 0u64;
    let mut received = 0u64;
    for entry in journal {
        match entry.direction {
            Direction::Send => sent += 1,
            Direction::Recv => received += 1,
        }
    }
    let ops_completed = history
        .iter()
        .filter(|r| matches!(r.kind, crate::journal::OpKind::Ok | crate::journal::OpKind::Fail | crate::journal::OpKind::Info))
        .count() as u64;
    NetworkStats {
        messages_sent: sent,
        messages_received: received,
        ops_completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the full lifecycle against `/bin/cat` wired up as a stand-in
    /// node: every line written to its stdin comes straight back on stdout,
    /// so it answers `init` with its own request echoed back rather than a
    /// well-formed `init_ok` — the run is expected to fail at the init
    /// handshake, which is exactly what this test asserts. A real end-to-end
    /// pass needs an actual Maelstrom-protocol binary, which this crate does
    /// not ship (user node binaries are external, per scope).
    #[tokio::test]
    async fn run_test_reports_setup_failure_for_a_non_protocol_binary() {
        let config = RunConfig {
            bin_path: PathBuf::from("/bin/cat"),
            workload_name: "echo".to_string(),
            node_ids: vec!["n1".to_string()],
            concurrency: 1,
            rate: None,
            time_limit: Duration::from_millis(50),
            latency_mean_ms: 0,
            latency_jitter_ms: 0,
            nemesis: NemesisKind::None,
            faults_interval: Duration::from_secs(1),
            timeout: Duration::from_millis(100),
            init_timeout: Duration::from_millis(100),
            seed: 42,
            percentiles: vec![50.0, 99.0],
            virtual_clock: false,
            log_dir: std::env::temp_dir(),
            log_stderr: false,
        };
        let result = run_test(config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_unknown_workload_before_touching_the_network() {
        let config = RunConfig {
            bin_path: PathBuf::from("/bin/cat"),
            workload_name: "does-not-exist".to_string(),
            node_ids: vec!["n1".to_string()],
            concurrency: 1,
            rate: None,
            time_limit: Duration::from_millis(10),
            latency_mean_ms: 0,
            latency_jitter_ms: 0,
            nemesis: NemesisKind::None,
            faults_interval: Duration::from_secs(1),
            timeout: Duration::from_millis(50),
            init_timeout: Duration::from_millis(50),
            seed: 1,
            percentiles: vec![50.0],
            virtual_clock: false,
            log_dir: std::env::temp_dir(),
            log_stderr: false,
        };
        let result = run_test(config).await;
        assert!(result.is_err());
    }
}

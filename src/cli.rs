//! # Command-Line Interface
//!
//! `clap`'s derive API wires up the three subcommands from the external
//! interface: `test` runs a workload against a node binary, `serve` exposes
//! a result directory over HTTP, `doc` emits the workload reference. Shared
//! value-parsers for duration-like flags and the `--concurrency "Mn"`
//! multiplier live in [`crate::utils`].

use crate::nemesis::NemesisKind;
use crate::utils::{parse_concurrency, parse_duration, Concurrency};
use clap::builder::styling::{AnsiColor, Styles};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_nemesis_kind(s: &str) -> Result<NemesisKind, String> {
    s.parse()
}

/// Matches clap v3's default help coloring rather than clap v4's undecorated
/// default, the same convention carried over from this crate's prior CLI.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Maelstrom - a workbench for testing toy distributed algorithms.
///
/// Runs a user-supplied node binary as a simulated cluster, drives synthetic
/// client load against it, injects faults, and checks the resulting
/// operation history against a workload's declared safety property.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable: -v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress the colorized stderr log layer; the detailed file layer is
    /// always on regardless of this flag.
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test against a node binary.
    Test(TestArgs),
    /// Serve a result directory over HTTP for interactive viewing.
    Serve(ServeArgs),
    /// Emit the built-in workload reference.
    Doc,
}

#[derive(Parser, Debug, Clone)]
pub struct TestArgs {
    /// Path to the node binary under test.
    #[arg(long, help_heading = "Core Options")]
    pub bin: PathBuf,

    /// Name of the workload to run (see `maelstrom doc`).
    #[arg(long, help_heading = "Core Options")]
    pub workload: String,

    /// Number of cluster nodes to spawn, named n1..nN.
    #[arg(long, default_value_t = defaults::NODE_COUNT, help_heading = "Core Options")]
    pub node_count: usize,

    /// Explicit comma-separated node ids, overriding `--node-count`.
    #[arg(long, value_delimiter = ',', help_heading = "Core Options")]
    pub nodes: Option<Vec<String>>,

    /// Number of logical clients: a bare integer, or "Mn" for M * node-count.
    #[arg(long, default_value = "1n", value_parser = parse_concurrency, help_heading = "Core Options")]
    pub concurrency: Concurrency,

    /// Target aggregate request rate across all clients, in requests/sec.
    #[arg(long, help_heading = "Core Options")]
    pub rate: Option<f64>,

    /// How long to run the load generators before draining.
    #[arg(long, default_value = "10s", value_parser = parse_duration, help_heading = "Timing")]
    pub time_limit: Duration,

    /// Mean simulated network latency per link, in milliseconds.
    #[arg(long, default_value_t = defaults::LATENCY_MEAN_MS, help_heading = "Network")]
    pub latency: u32,

    /// Latency jitter (standard deviation of the normal draw), in milliseconds.
    #[arg(long, default_value_t = defaults::LATENCY_JITTER_MS, help_heading = "Network")]
    pub latency_jitter: u32,

    /// Fault scheduler kind: none, partition, pause, or kill.
    #[arg(long, default_value_t = NemesisKind::None, value_parser = parse_nemesis_kind, help_heading = "Faults")]
    pub nemesis: NemesisKind,

    /// Interval between nemesis transitions.
    #[arg(long, default_value = "5s", value_parser = parse_duration, help_heading = "Faults")]
    pub faults_interval: Duration,

    /// Per-request client timeout.
    #[arg(long, default_value = "5s", value_parser = parse_duration, help_heading = "Core Options")]
    pub timeout: Duration,

    /// Timeout for the init handshake with each node.
    #[arg(long, default_value = "5s", value_parser = parse_duration, help_heading = "Core Options")]
    pub init_timeout: Duration,

    /// Seed for every pseudo-random source in the run (network latency
    /// draws, nemesis choices, workload op generation), for determinism.
    #[arg(long, default_value_t = 0, help_heading = "Core Options")]
    pub seed: u64,

    /// Also forward each node's stderr lines through the harness's own log
    /// output, in addition to always appending them to `node-<id>.log`.
    #[arg(long, help_heading = "Output")]
    pub log_stderr: bool,

    /// Drive the run on a virtual clock instead of the OS clock, jumping
    /// straight between scheduled events for deterministic, much-faster-
    /// than-real-time execution.
    #[arg(long, help_heading = "Core Options")]
    pub virtual_clock: bool,

    /// Directory under which result bundles are written.
    #[arg(long, default_value = "./store", help_heading = "Output")]
    pub store_dir: PathBuf,

    /// Percentiles to report in the latency summary.
    #[arg(long, value_delimiter = ',', default_value = "50,95,99", help_heading = "Output")]
    pub percentiles: Vec<f64>,
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Result store directory to serve (the same `--store-dir` a test run used).
    #[arg(long, default_value = "./store")]
    pub store_dir: PathBuf,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

/// Centralized CLI defaults, mirroring the prior benchmark CLI's
/// `defaults` module convention.
pub mod defaults {
    pub const NODE_COUNT: usize = 5;
    pub const LATENCY_MEAN_MS: u32 = 0;
    pub const LATENCY_JITTER_MS: u32 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_test_invocation() {
        let cli = Cli::try_parse_from(["maelstrom", "test", "--bin", "/bin/true", "--workload", "echo"]).unwrap();
        match cli.command {
            Command::Test(args) => {
                assert_eq!(args.bin, PathBuf::from("/bin/true"));
                assert_eq!(args.workload, "echo");
                assert_eq!(args.node_count, defaults::NODE_COUNT);
                assert_eq!(args.concurrency.resolve(args.node_count), args.node_count);
            }
            other => panic!("expected Test, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_required_flags() {
        assert!(Cli::try_parse_from(["maelstrom", "test", "--workload", "echo"]).is_err());
    }

    #[test]
    fn parses_explicit_node_list_and_nemesis_kind() {
        let cli = Cli::try_parse_from([
            "maelstrom",
            "test",
            "--bin",
            "/bin/true",
            "--workload",
            "lin-kv",
            "--nodes",
            "n1,n2,n3",
            "--nemesis",
            "partition",
            "--concurrency",
            "2n",
        ])
        .unwrap();
        match cli.command {
            Command::Test(args) => {
                assert_eq!(args.nodes, Some(vec!["n1".to_string(), "n2".to_string(), "n3".to_string()]));
                assert_eq!(args.nemesis, NemesisKind::Partition);
                assert_eq!(args.concurrency.resolve(3), 6);
            }
            other => panic!("expected Test, got {other:?}"),
        }
    }

    #[test]
    fn doc_and_serve_subcommands_parse() {
        assert!(matches!(Cli::try_parse_from(["maelstrom", "doc"]).unwrap().command, Command::Doc));
        let cli = Cli::try_parse_from(["maelstrom", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Command::Serve(args) => assert_eq!(args.port, 9000),
            other => panic!("expected Serve, got {other:?}"),
        }
    }
}

//! # Maelstrom - Main Entry Point
//!
//! Three subcommands, per the external CLI surface:
//! - `test`: runs a workload against a node binary and prints the verdict.
//! - `serve`: exposes a result-store directory over HTTP.
//! - `doc`: prints the built-in workload reference.
//!
//! ## Exit codes
//!
//! `0` valid, `1` invalid, `2` setup failure, `3` usage error — the exact
//! mapping the external interface specifies. `clap` itself already exits
//! with `2` on a parse failure; this module reserves `3` for usage errors
//! clap can't catch statically (an unknown `--workload` name).

use anyhow::Result;
use clap::Parser;
use maelstrom::cli::{Cli, Command, ServeArgs, TestArgs};
use maelstrom::logging::ColorizedFormatter;
use maelstrom::results::ResultBundle;
use maelstrom::runner::{run_test, RunConfig};
use maelstrom::{serve, workload};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

const EXIT_VALID: i32 = 0;
const EXIT_INVALID: i32 = 1;
const EXIT_SETUP_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The detailed file layer rotates daily under the run's own log
    // directory, so it needs a directory to exist before the subscriber can
    // be installed; `serve`/`doc` have no natural result directory to log
    // into, so they fall back to the process's working directory.
    let log_dir = match &cli.command {
        Command::Test(args) => args.store_dir.join(".logs"),
        Command::Serve(args) => args.store_dir.clone(),
        Command::Doc => std::env::temp_dir(),
    };
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("failed to create log directory {log_dir:?}: {e}");
        std::process::exit(EXIT_SETUP_FAILURE);
    }
    let _log_guard = init_logging(cli.verbose, cli.quiet, &log_dir);

    let exit_code = match cli.command {
        Command::Test(args) => run_test_command(args).await,
        Command::Serve(args) => run_serve_command(args).await,
        Command::Doc => run_doc_command(),
    };

    std::process::exit(exit_code);
}

/// Configures the two-layer logging setup: a detailed, always-on file layer
/// (`maelstrom.log.<date>`, rotated daily) and a colorized stdout layer for
/// user-facing output, silenced by `--quiet`. Verbosity follows the
/// repeatable `-v` flag: default INFO, `-v` DEBUG, `-vv`+ TRACE. Returns the
/// non-blocking writer's guard, which must be kept alive for the duration
/// of the program or buffered file-log lines are lost on exit.
fn init_logging(verbose: u8, quiet: bool, log_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let log_level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "maelstrom.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_filter(log_level);

    let stdout_layer = if !quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();

    let today = chrono::Local::now().format("%Y-%m-%d");
    info!(log_dir = %log_dir.display(), file = %format!("maelstrom.log.{today}"), "logging initialized");
    guard
}

async fn run_test_command(args: TestArgs) -> i32 {
    if workload::lookup(&args.workload).is_none() {
        error!(workload = %args.workload, "unknown workload (see `maelstrom doc`)");
        return EXIT_USAGE_ERROR;
    }

    let node_ids = match resolve_node_ids(&args) {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "usage error");
            return EXIT_USAGE_ERROR;
        }
    };
    let node_count = node_ids.len();
    let concurrency = args.concurrency.resolve(node_count);
    let log_dir = args.store_dir.join(".logs");

    let config = RunConfig {
        bin_path: args.bin,
        workload_name: args.workload.clone(),
        node_ids,
        concurrency,
        rate: args.rate,
        time_limit: args.time_limit,
        latency_mean_ms: args.latency,
        latency_jitter_ms: args.latency_jitter,
        nemesis: args.nemesis,
        faults_interval: args.faults_interval,
        timeout: args.timeout,
        init_timeout: args.init_timeout,
        seed: args.seed,
        percentiles: args.percentiles,
        virtual_clock: args.virtual_clock,
        log_dir,
        log_stderr: args.log_stderr,
    };

    info!(workload = %args.workload, nodes = node_count, concurrency, "starting test run");

    let outcome = match run_test(config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = ?e, "setup failure");
            return EXIT_SETUP_FAILURE;
        }
    };

    let valid = outcome.check.valid;
    let bundle = ResultBundle {
        workload: args.workload,
        seed: args.seed,
        check: outcome.check,
        history: outcome.history,
        journal: outcome.journal,
        latency: outcome.latency,
        network_stats: outcome.network_stats,
    };

    match bundle.persist(&args.store_dir) {
        Ok(run_dir) => info!(run_dir = %run_dir.display(), "result bundle written"),
        Err(e) => error!(error = ?e, "failed to persist result bundle"),
    }

    bundle.print_verdict();

    if valid {
        EXIT_VALID
    } else {
        EXIT_INVALID
    }
}

/// `--nodes` overrides `--node-count` when given; otherwise synthesizes
/// `n1..nN`, matching the node-id convention the network core and runner
/// assume everywhere else.
fn resolve_node_ids(args: &TestArgs) -> Result<Vec<String>, String> {
    if let Some(nodes) = &args.nodes {
        if nodes.is_empty() {
            return Err("--nodes must name at least one node".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for id in nodes {
            if !seen.insert(id.clone()) {
                return Err(format!("duplicate node id {id:?} in --nodes"));
            }
        }
        return Ok(nodes.clone());
    }
    if args.node_count == 0 {
        return Err("--node-count must be at least 1".to_string());
    }
    Ok((1..=args.node_count).map(|i| format!("n{i}")).collect())
}

async fn run_serve_command(args: ServeArgs) -> i32 {
    if !args.store_dir.exists() {
        error!(dir = %args.store_dir.display(), "store directory does not exist");
        return EXIT_SETUP_FAILURE;
    }
    match serve::serve(args.store_dir, args.port).await {
        Ok(()) => EXIT_VALID,
        Err(e) => {
            error!(error = ?e, "serve failed");
            EXIT_SETUP_FAILURE
        }
    }
}

fn run_doc_command() -> i32 {
    println!("Maelstrom built-in workload reference\n");
    println!("echo");
    println!("  Sends {{type: \"echo\", echo: <value>}} to a cluster node, expects");
    println!("  {{type: \"echo_ok\", echo: <same value>}} back. No built-in service");
    println!("  involvement; exercises request/reply plumbing end to end.\n");
    println!("lin-kv");
    println!("  Drives the built-in lin-kv service directly with a small fixed");
    println!("  keyspace, issuing read/write/cas uniformly at random; reads every");
    println!("  key once during drain so the checker can observe converged state.\n");
    println!("Built-in services available to any workload or node: lin-kv, seq-kv,");
    println!("lww-kv, lin-tso. See §4.3 of the design document for their request");
    println!("and reply shapes.");
    EXIT_VALID
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn test_args(extra: &[&str]) -> TestArgs {
        let mut argv = vec!["maelstrom", "test", "--bin", "/bin/true", "--workload", "echo"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Test(args) => args,
            other => panic!("expected Test, got {other:?}"),
        }
    }

    #[test]
    fn resolve_node_ids_defaults_to_n_prefixed_range() {
        let args = test_args(&["--node-count", "3"]);
        assert_eq!(resolve_node_ids(&args).unwrap(), vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn resolve_node_ids_honors_explicit_nodes_list() {
        let args = test_args(&["--nodes", "a,b,c"]);
        assert_eq!(resolve_node_ids(&args).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn resolve_node_ids_rejects_duplicates() {
        let args = test_args(&["--nodes", "a,a"]);
        assert!(resolve_node_ids(&args).is_err());
    }

    #[test]
    fn resolve_node_ids_rejects_zero_node_count() {
        let args = test_args(&["--node-count", "0"]);
        assert!(resolve_node_ids(&args).is_err());
    }

    #[test]
    fn doc_command_always_succeeds() {
        assert_eq!(run_doc_command(), EXIT_VALID);
    }
}

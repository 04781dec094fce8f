//! # Maelstrom
//!
//! A workbench for teaching and testing toy distributed algorithms: runs a
//! user-supplied node binary as a simulated cluster, drives synthetic client
//! load against it over a programmable transport, injects faults, and
//! checks the resulting operation history against a declared safety
//! property.
//!
//! This crate is the *core*: the simulated network, built-in services,
//! client fleet, fault scheduler and test runner. The workload catalog and
//! deep consistency checkers are a plug-point (see [`workload::Workload`]
//! and [`checker::Checker`]) rather than baked into the core.

pub mod checker;
pub mod cli;
pub mod client;
pub mod clock;
pub mod error;
pub mod init;
pub mod journal;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod nemesis;
pub mod network;
pub mod node;
pub mod plot;
pub mod results;
pub mod runner;
pub mod serve;
pub mod services;
pub mod utils;
pub mod workload;

pub use checker::{CheckResult, Checker};
pub use message::{Direction, Message, NodeId};
pub use results::ResultBundle;
pub use runner::{run_test, RunConfig, RunOutcome};
pub use workload::Workload;

/// The current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! # Node Process Supervisor
//!
//! Owns one subprocess implementing a user-supplied cluster node: spawns it,
//! pipes outbound messages to its stdin as newline-delimited JSON, parses its
//! stdout the same way and hands parsed messages to the [`NetworkCore`] as
//! sends, tees stderr to a per-node log file, and tears it down on request.

use crate::message::Message;
use crate::network::NetworkCore;
use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

/// `Spawning → Running ↔ Paused → Exited`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Spawning,
    Running,
    Paused,
    Exited,
}

/// Owns one user node subprocess. `Paused` suspends delivery of outbound
/// messages to the process (accumulating them in an internal queue) without
/// touching its pipes; the OS process itself is suspended via `SIGSTOP` on
/// unix platforms so it genuinely stops making progress, matching the
/// nemesis `pause` fault.
pub struct NodeSupervisor {
    node_id: String,
    bin_path: PathBuf,
    log_path: PathBuf,
    log_stderr: bool,
    child: Mutex<Option<Child>>,
    state: Mutex<SupervisorState>,
    paused: AtomicBool,
    resume_notify: Notify,
}

impl NodeSupervisor {
    pub fn new(node_id: impl Into<String>, bin_path: PathBuf, log_path: PathBuf) -> Arc<Self> {
        Self::with_stderr_logging(node_id, bin_path, log_path, false)
    }

    /// Like [`NodeSupervisor::new`], but when `log_stderr` is set the
    /// per-node stderr tee also forwards each line through `tracing` (the
    /// `--log-stderr` CLI flag's effect) instead of only appending it to
    /// `node-<id>.log`.
    pub fn with_stderr_logging(node_id: impl Into<String>, bin_path: PathBuf, log_path: PathBuf, log_stderr: bool) -> Arc<Self> {
        Arc::new(Self {
            node_id: node_id.into(),
            bin_path,
            log_path,
            log_stderr,
            child: Mutex::new(None),
            state: Mutex::new(SupervisorState::Spawning),
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub async fn state(&self) -> SupervisorState {
        *self.state.lock().await
    }

    /// Spawn the subprocess and start the stdin writer and stdout reader
    /// tasks. `network` is where parsed stdout lines are handed off as
    /// sends and where this node's inbox lives.
    pub async fn spawn(self: &Arc<Self>, network: Arc<NetworkCore>) -> Result<()> {
        let mut child = Command::new(&self.bin_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn node binary {:?}", self.bin_path))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("child stdin not piped"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("child stdout not piped"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("child stderr not piped"))?;

        *self.child.lock().await = Some(child);
        *self.state.lock().await = SupervisorState::Running;

        let inbox = network.attach(self.node_id.clone()).await;

        // stdin writer: forwards inbox deliveries to the process unless paused.
        // While paused, messages accumulate in `pending` rather than being
        // written; the loop wakes on `resume_notify` to flush them.
        {
            let node_id = self.node_id.clone();
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut stdin = stdin;
                let mut inbox = inbox;
                let mut pending: VecDeque<Message> = VecDeque::new();
                loop {
                    if this.paused.load(Ordering::SeqCst) {
                        tokio::select! {
                            maybe_msg = inbox.recv() => {
                                let Some(msg) = maybe_msg else { break };
                                pending.push_back(msg);
                            }
                            _ = this.resume_notify.notified() => {}
                        }
                        continue;
                    }

                    let msg = if let Some(msg) = pending.pop_front() {
                        msg
                    } else {
                        match inbox.recv().await {
                            Some(msg) => msg,
                            None => break,
                        }
                    };

                    let line = format!("{}\n", msg.to_wire_line());
                    if let Err(e) = stdin.write_all(line.as_bytes()).await {
                        warn!(node = %node_id, error = %e, "stdin write failed, node likely exited");
                        break;
                    }
                    if stdin.flush().await.is_err() {
                        break;
                    }
                }
            });
        }

        // stdout reader: parses lines, hands them to the network as sends.
        {
            let node_id = self.node_id.clone();
            let network = Arc::clone(&network);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match Message::from_wire_line(&line) {
                            Ok(msg) => network.send(msg).await,
                            Err(e) => {
                                error!(node = %node_id, line = %line, error = %e, "malformed message line from node");
                                *this.state.lock().await = SupervisorState::Exited;
                                break;
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            error!(node = %node_id, error = %e, "error reading node stdout");
                            break;
                        }
                    }
                }
            });
        }

        // stderr tee: appended verbatim to node-<id>.log, and additionally
        // forwarded through tracing when `--log-stderr` is set.
        {
            let log_path = self.log_path.clone();
            let node_id = self.node_id.clone();
            let log_stderr = self.log_stderr;
            tokio::spawn(async move {
                let Ok(mut file) = tokio::fs::File::create(&log_path).await else {
                    return;
                };
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if log_stderr {
                        tracing::debug!(node = %node_id, "{line}");
                    }
                    let _ = file.write_all(format!("{line}\n").as_bytes()).await;
                }
            });
        }

        info!(node = %self.node_id, bin = ?self.bin_path, "node spawned");
        Ok(())
    }

    /// Suspend the process (nemesis `pause`). Outbound messages accumulate
    /// rather than being written to stdin.
    pub async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        *self.state.lock().await = SupervisorState::Paused;
        #[cfg(unix)]
        if let Some(child) = self.child.lock().await.as_ref() {
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(pid as i32, libc::SIGSTOP);
                }
            }
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        *self.state.lock().await = SupervisorState::Running;
        #[cfg(unix)]
        if let Some(child) = self.child.lock().await.as_ref() {
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(pid as i32, libc::SIGCONT);
                }
            }
        }
        self.resume_notify.notify_waiters();
        Ok(())
    }

    /// Nemesis `kill`: tear the subprocess down and spawn a fresh one under
    /// the same node id. The caller (the nemesis loop) is responsible for
    /// re-running the init handshake afterward — restarting the process is
    /// this supervisor's concern, re-telling it who it is is the init
    /// protocol's.
    pub async fn restart(self: &Arc<Self>, network: Arc<NetworkCore>, grace: std::time::Duration) -> Result<()> {
        self.teardown(grace).await?;
        *self.state.lock().await = SupervisorState::Spawning;
        self.paused.store(false, Ordering::SeqCst);
        self.spawn(network).await
    }

    /// Close stdin, wait briefly for clean exit, then kill.
    pub async fn teardown(&self, grace: std::time::Duration) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if let Some(stdin) = child.stdin.take() {
                drop(stdin);
            }
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(_)) => {}
                _ => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
        *self.state.lock().await = SupervisorState::Exited;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::journal::Journal;
    use crate::network::NetworkConfig;
    use std::io::Write;

    /// Spawns `/bin/cat` as a stand-in "node": echoes whatever is written to
    /// its stdin back on stdout, which is not a valid Maelstrom node but is
    /// enough to exercise the pipe plumbing without a real test binary.
    #[tokio::test]
    async fn teardown_closes_stdin_and_waits() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());

        let mut log_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(log_file, "").ok();

        let supervisor = NodeSupervisor::new("n1", PathBuf::from("/bin/cat"), log_file.path().to_path_buf());
        supervisor.spawn(network).await.expect("spawn /bin/cat");
        supervisor
            .teardown(std::time::Duration::from_millis(500))
            .await
            .expect("teardown");
        assert_eq!(supervisor.state().await, SupervisorState::Exited);
    }

    /// `--log-stderr` only changes whether the stderr tee also forwards
    /// through tracing; it should not affect the spawn/teardown lifecycle.
    #[tokio::test]
    async fn spawns_and_tears_down_with_stderr_logging_enabled() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());

        let log_file = tempfile::NamedTempFile::new().unwrap();
        let supervisor = NodeSupervisor::with_stderr_logging("n1", PathBuf::from("/bin/cat"), log_file.path().to_path_buf(), true);
        supervisor.spawn(network).await.expect("spawn /bin/cat");
        supervisor
            .teardown(std::time::Duration::from_millis(500))
            .await
            .expect("teardown");
        assert_eq!(supervisor.state().await, SupervisorState::Exited);
    }
}

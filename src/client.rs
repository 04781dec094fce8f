//! # Client Fleet & Workload Driver
//!
//! A pool of logical clients, each an independent virtual node (`cN`)
//! attached to the [`NetworkCore`]. Every client runs its own copy of the
//! workload driver loop: ask the workload for the next op, send it, await a
//! reply correlated by `in_reply_to` within a timeout, and append the
//! matching `invoke`/`ok`/`fail`/`info` record to [`History`]. At most one
//! outstanding request per client is guaranteed by the structure of the
//! loop — there is nowhere in it that issues a second send before the first
//! has completed.

use crate::clock::Clock;
use crate::error::MaelstromError;
use crate::journal::{History, OpKind};
use crate::message::{Message, NodeId};
use crate::metrics::LatencyCollector;
use crate::network::NetworkCore;
use crate::workload::Workload;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Parameters shared by every client in the fleet.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub timeout: Duration,
    /// Target inter-request interval for this one client, derived from
    /// `--rate` divided across the fleet. `None` means unthrottled.
    pub interval: Option<Duration>,
}

enum Outcome {
    Reply(Message),
    Timeout,
    ChannelClosed,
}

/// One logical client. Owns its own next-msg-id counter and per-client RNG;
/// nothing about it is shared with any other client.
pub struct ClientActor {
    id: NodeId,
    ordinal: usize,
    network: Arc<NetworkCore>,
    clock: Arc<dyn Clock>,
    history: Arc<History>,
    workload: Arc<dyn Workload>,
    nodes: Vec<NodeId>,
    config: ClientConfig,
    rng: StdRng,
}

impl ClientActor {
    pub fn new(
        id: impl Into<NodeId>,
        ordinal: usize,
        network: Arc<NetworkCore>,
        clock: Arc<dyn Clock>,
        history: Arc<History>,
        workload: Arc<dyn Workload>,
        nodes: Vec<NodeId>,
        config: ClientConfig,
        seed: u64,
    ) -> Self {
        Self {
            id: id.into(),
            ordinal,
            network,
            clock,
            history,
            workload,
            nodes,
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Drive the workload loop until `stop` fires, returning this client's
    /// latency collector so the fleet can merge it into the run's `stats`
    /// block.
    pub async fn run(
        mut self,
        mut inbox: tokio::sync::mpsc::UnboundedReceiver<Message>,
        mut stop: watch::Receiver<bool>,
    ) -> LatencyCollector {
        let mut next_msg_id: u64 = 1;
        let mut op_index: u64 = 0;
        let mut latency = LatencyCollector::new();

        loop {
            if *stop.borrow() {
                break;
            }
            if let Some(interval) = self.config.interval {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => if *stop.borrow() { break; },
                }
            }
            if *stop.borrow() {
                break;
            }

            let op = self.workload.next_op(self.ordinal, &mut self.rng);
            let target = self.workload.target(self.ordinal, op_index, &self.nodes);
            let msg_id = next_msg_id;
            next_msg_id += 1;
            op_index += 1;

            let invoke_at_ns = self.clock.now_ns();
            self.history.append(self.id.clone(), invoke_at_ns, OpKind::Invoke, op.f.clone(), op.value.clone());

            let body = self.workload.encode(msg_id, &op);
            self.network.send(Message::new(self.id.clone(), target, body)).await;

            let deadline_ns = invoke_at_ns + self.config.timeout.as_nanos() as u64;
            let outcome = self.await_reply(&mut inbox, msg_id, deadline_ns).await;

            let completed_at_ns = self.clock.now_ns();
            latency.record(Duration::from_nanos(completed_at_ns.saturating_sub(invoke_at_ns)));

            let (kind, value) = match outcome {
                Outcome::Reply(reply) if reply.body_type().ends_with("_ok") => {
                    (OpKind::Ok, self.workload.decode_ok(&op, &reply.body))
                }
                Outcome::Reply(reply) if reply.body_type() == "error" => {
                    let code = reply.body.get("code").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                    let definite = MaelstromError::new(code, "").is_definite();
                    let value = reply.body.clone();
                    if definite {
                        (OpKind::Fail, value)
                    } else {
                        (OpKind::Info, value)
                    }
                }
                Outcome::Reply(reply) => {
                    debug!(body_type = reply.body_type(), "unrecognized reply shape, treating as info");
                    (OpKind::Info, reply.body.clone())
                }
                Outcome::Timeout => (OpKind::Info, serde_json::json!({"error": "timeout"})),
                Outcome::ChannelClosed => {
                    self.history.append(self.id.clone(), completed_at_ns, OpKind::Info, op.f.clone(), serde_json::json!({"error": "client detached"}));
                    break;
                }
            };
            self.history.append(self.id.clone(), completed_at_ns, kind, op.f, value);
        }

        latency
    }

    /// Read from `inbox` until a reply with `in_reply_to == msg_id` arrives
    /// or `deadline_ns` passes. Messages that don't match are discarded —
    /// they are late replies to a previously timed-out request, which per
    /// the concurrency model have no effect on history even though they're
    /// still journaled by the network core.
    ///
    /// The deadline is a timer scheduled on the network core's own pending
    /// queue rather than a direct `Clock::wait_until` call: the pump is the
    /// only actor allowed to block on the clock directly, so every other
    /// wait — this one included — rides the same queue that carries message
    /// deliveries instead of racing the clock on its own.
    async fn await_reply(
        &self,
        inbox: &mut tokio::sync::mpsc::UnboundedReceiver<Message>,
        msg_id: u64,
        deadline_ns: u64,
    ) -> Outcome {
        let mut timer = self.network.schedule_timer(deadline_ns).await;
        loop {
            tokio::select! {
                maybe_msg = inbox.recv() => {
                    match maybe_msg {
                        Some(msg) if msg.in_reply_to() == Some(msg_id) => return Outcome::Reply(msg),
                        Some(_) => continue,
                        None => return Outcome::ChannelClosed,
                    }
                }
                _ = &mut timer => return Outcome::Timeout,
            }
        }
    }
}

/// Issue `workload.final_ops(nodes)` once, during the drain phase, as a
/// single pseudo-client process named `"final"`. Used by the test runner
/// after the load-generation stop signal fires and the network has healed.
pub async fn run_final_ops(
    network: Arc<NetworkCore>,
    clock: Arc<dyn Clock>,
    history: Arc<History>,
    workload: Arc<dyn Workload>,
    nodes: Vec<NodeId>,
    timeout: Duration,
) {
    const PROCESS: &str = "final";
    let mut inbox = network.attach(PROCESS).await;
    let mut msg_id: u64 = 1;

    for op in workload.final_ops(&nodes) {
        let target = workload.target(0, msg_id, &nodes);
        let invoke_at_ns = clock.now_ns();
        history.append(PROCESS, invoke_at_ns, OpKind::Invoke, op.f.clone(), op.value.clone());

        let body = workload.encode(msg_id, &op);
        network.send(Message::new(PROCESS, target, body)).await;

        let deadline_ns = invoke_at_ns + timeout.as_nanos() as u64;
        let mut timer = network.schedule_timer(deadline_ns).await;
        let outcome = loop {
            tokio::select! {
                maybe_msg = inbox.recv() => {
                    match maybe_msg {
                        Some(msg) if msg.in_reply_to() == Some(msg_id) => break Outcome::Reply(msg),
                        Some(_) => continue,
                        None => break Outcome::ChannelClosed,
                    }
                }
                _ = &mut timer => break Outcome::Timeout,
            }
        };

        let completed_at_ns = clock.now_ns();
        let (kind, value) = match outcome {
            Outcome::Reply(reply) if reply.body_type().ends_with("_ok") => (OpKind::Ok, workload.decode_ok(&op, &reply.body)),
            Outcome::Reply(reply) if reply.body_type() == "error" => {
                let code = reply.body.get("code").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                if MaelstromError::new(code, "").is_definite() {
                    (OpKind::Fail, reply.body.clone())
                } else {
                    (OpKind::Info, reply.body.clone())
                }
            }
            Outcome::Reply(reply) => (OpKind::Info, reply.body.clone()),
            Outcome::Timeout => (OpKind::Info, serde_json::json!({"error": "timeout"})),
            Outcome::ChannelClosed => (OpKind::Info, serde_json::json!({"error": "network detached"})),
        };
        history.append(PROCESS, completed_at_ns, kind, op.f, value);
        msg_id += 1;
    }

    network.detach(PROCESS).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::journal::{Journal, OpKind};
    use crate::network::NetworkConfig;
    use crate::workload::EchoWorkload;

    #[tokio::test]
    async fn client_records_ok_on_matching_reply() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock.clone(), journal, NetworkConfig::default());
        let node_inbox = network.attach("n1").await;
        network.spawn_pump();

        let history = Arc::new(History::new());
        let workload: Arc<dyn Workload> = Arc::new(EchoWorkload::new());
        let client_inbox = network.attach("c1").await;
        let (stop_tx, stop_rx) = watch::channel(false);

        let responder_network = network.clone();
        let mut node_inbox = node_inbox;
        tokio::spawn(async move {
            if let Some(req) = node_inbox.recv().await {
                let in_reply_to = req.msg_id().unwrap_or(0);
                let echo = req.body.get("echo").cloned().unwrap_or(serde_json::Value::Null);
                responder_network
                    .send(Message::new("n1", req.src.clone(), serde_json::json!({"type": "echo_ok", "in_reply_to": in_reply_to, "echo": echo})))
                    .await;
            }
        });

        let config = ClientConfig { timeout: Duration::from_secs(1), interval: None };
        let client = ClientActor::new("c1", 0, network.clone(), clock, history.clone(), workload, vec!["n1".to_string()], config, 0);

        let handle = tokio::spawn(client.run(client_inbox, stop_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).ok();
        let _latency = handle.await.unwrap();

        let snapshot = history.snapshot();
        assert!(snapshot.iter().any(|r| r.kind == OpKind::Ok));
    }

    #[tokio::test]
    async fn client_records_info_on_timeout() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock.clone(), journal, NetworkConfig::default());
        let _node_inbox = network.attach("n1").await;
        network.spawn_pump();

        let history = Arc::new(History::new());
        let workload: Arc<dyn Workload> = Arc::new(EchoWorkload::new());
        let client_inbox = network.attach("c1").await;
        let (stop_tx, stop_rx) = watch::channel(false);

        let config = ClientConfig { timeout: Duration::from_millis(10), interval: None };
        let client = ClientActor::new("c1", 0, network.clone(), clock, history.clone(), workload, vec!["n1".to_string()], config, 0);

        let handle = tokio::spawn(client.run(client_inbox, stop_rx));
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop_tx.send(true).ok();
        let _latency = handle.await.unwrap();

        let snapshot = history.snapshot();
        assert!(snapshot.iter().any(|r| r.kind == OpKind::Info));
    }
}

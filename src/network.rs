//! # Network Core
//!
//! The simulated transport all other actors — user nodes, clients, built-in
//! services, the nemesis — address each other through. Presents a uniform
//! `send`/`recv` interface and enforces latency, loss, duplication and
//! partitioning per the configured link matrix.
//!
//! ## Architecture
//!
//! ```text
//!                 send(msg)                     recv(node_id)
//!                    |                                ^
//!                    v                                |
//!           +------------------+              +---------------+
//!           |  link lookup +   | --enqueue--> | pending-delivery|--deliver--> per-node
//!           |  latency draw    |              |  priority queue |            inbox
//!           +------------------+              +---------------+
//! ```
//!
//! The pending-delivery queue is drained by a single background pump task
//! that waits (through the [`Clock`] abstraction) until the earliest
//! scheduled delivery time, then hands the message to the destination's
//! inbox and journals the `recv` event. Ties at the same delivery instant
//! are broken by insertion order (a monotonic sequence number), giving FIFO
//! delivery for simultaneous events without requiring FIFO across distinct
//! delivery times.

use crate::clock::Clock;
use crate::error::MaelstromError;
use crate::journal::Journal;
use crate::message::{Direction, Message, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, trace, warn};

/// Per-edge transport characteristics for an ordered pair `(src, dest)`.
/// The matrix need not be symmetric: partitions may be one-way.
#[derive(Clone, Debug)]
pub struct LinkState {
    pub partitioned: bool,
    pub latency_mean_ms: u32,
    pub latency_jitter_ms: u32,
}

impl LinkState {
    pub fn new(latency_mean_ms: u32, latency_jitter_ms: u32) -> Self {
        Self {
            partitioned: false,
            latency_mean_ms,
            latency_jitter_ms,
        }
    }
}

/// Either a message delivery or a bare wake-up, sharing the same
/// pending-delivery queue so every time-dependent decision in the system —
/// message arrival, request timeouts, nemesis intervals — is driven off one
/// clock instead of each actor sleeping independently (see DESIGN.md).
enum PendingKind {
    Message(Message),
    Timer(tokio::sync::oneshot::Sender<()>),
}

struct PendingItem {
    deliver_at_ns: u64,
    seq: u64,
    kind: PendingKind,
}

impl PartialEq for PendingItem {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_at_ns == other.deliver_at_ns && self.seq == other.seq
    }
}
impl Eq for PendingItem {}

impl PartialOrd for PendingItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingItem {
    /// Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
    /// `(deliver_at_ns, seq)`.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deliver_at_ns
            .cmp(&self.deliver_at_ns)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Configuration applied uniformly to every link at attach time; the
/// nemesis and test setup may override individual links afterward.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub latency_mean_ms: u32,
    pub latency_jitter_ms: u32,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency_mean_ms: 0,
            latency_jitter_ms: 0,
            seed: 0,
        }
    }
}

pub struct NetworkCore {
    clock: Arc<dyn Clock>,
    journal: Arc<Journal>,
    config: NetworkConfig,
    nodes: Mutex<HashSet<NodeId>>,
    links: Mutex<HashMap<(NodeId, NodeId), LinkState>>,
    inboxes: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Message>>>,
    pending: Mutex<BinaryHeap<PendingItem>>,
    notify: Notify,
    next_msg_id: AtomicU64,
    next_seq: AtomicU64,
    rng: Mutex<StdRng>,
}

impl NetworkCore {
    pub fn new(clock: Arc<dyn Clock>, journal: Arc<Journal>, config: NetworkConfig) -> Arc<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Arc::new(Self {
            clock,
            journal,
            config,
            nodes: Mutex::new(HashSet::new()),
            links: Mutex::new(HashMap::new()),
            inboxes: Mutex::new(HashMap::new()),
            pending: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            next_msg_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
            rng: Mutex::new(rng),
        })
    }

    /// Attach a node to the network, registering it as a known destination
    /// and returning the receiving half of its inbox. One receiver per node;
    /// calling this twice for the same id replaces the previous inbox.
    pub async fn attach(&self, node_id: impl Into<NodeId>) -> mpsc::UnboundedReceiver<Message> {
        let node_id = node_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes.lock().await.insert(node_id.clone());
        self.inboxes.lock().await.insert(node_id, tx);
        rx
    }

    pub async fn detach(&self, node_id: &str) {
        self.nodes.lock().await.remove(node_id);
        self.inboxes.lock().await.remove(node_id);
    }

    pub async fn known_nodes(&self) -> Vec<NodeId> {
        self.nodes.lock().await.iter().cloned().collect()
    }

    fn link_key(src: &str, dest: &str) -> (NodeId, NodeId) {
        (src.to_string(), dest.to_string())
    }

    async fn link_for(&self, src: &str, dest: &str) -> LinkState {
        let mut links = self.links.lock().await;
        links
            .entry(Self::link_key(src, dest))
            .or_insert_with(|| LinkState::new(self.config.latency_mean_ms, self.config.latency_jitter_ms))
            .clone()
    }

    pub async fn set_partitioned(&self, src: &str, dest: &str, partitioned: bool) {
        let mut links = self.links.lock().await;
        let entry = links
            .entry(Self::link_key(src, dest))
            .or_insert_with(|| LinkState::new(self.config.latency_mean_ms, self.config.latency_jitter_ms));
        entry.partitioned = partitioned;
    }

    pub async fn set_latency(&self, src: &str, dest: &str, mean_ms: u32, jitter_ms: u32) {
        let mut links = self.links.lock().await;
        let entry = links
            .entry(Self::link_key(src, dest))
            .or_insert_with(|| LinkState::new(mean_ms, jitter_ms));
        entry.latency_mean_ms = mean_ms;
        entry.latency_jitter_ms = jitter_ms;
    }

    /// Heal every link currently known: clears `partitioned` on all pairs.
    pub async fn heal_all(&self) {
        let mut links = self.links.lock().await;
        for link in links.values_mut() {
            link.partitioned = false;
        }
    }

    /// Sample `max(0, normal(mean_ms, jitter_ms))` milliseconds via a
    /// Box-Muller transform, converted to nanoseconds.
    async fn sample_latency_ns(&self, mean_ms: u32, jitter_ms: u32) -> u64 {
        if jitter_ms == 0 {
            return (mean_ms as u64).saturating_mul(1_000_000);
        }
        let mut rng = self.rng.lock().await;
        let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = rng.gen();
        let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let sampled_ms = mean_ms as f64 + jitter_ms as f64 * z0;
        let clamped_ms = sampled_ms.max(0.0);
        (clamped_ms * 1_000_000.0) as u64
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue `message` for delivery per the transport contract in §4.1.
    pub async fn send(self: &Arc<Self>, mut message: Message) {
        let id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        message.id = id;

        let now = self.clock.now_ns();
        self.journal.append(now, Direction::Send, message.clone());

        let known = self.nodes.lock().await;
        let src_known = known.contains(&message.src);
        let dest_known = known.contains(&message.dest);
        drop(known);

        if !dest_known || !src_known {
            if src_known {
                let err = MaelstromError::node_does_not_exist(&message.dest);
                let in_reply_to = message.msg_id().unwrap_or(0);
                let reply_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
                let reply = Message::new(message.dest.clone(), message.src.clone(), err.to_body(in_reply_to)).with_id(reply_id);
                let now = self.clock.now_ns();
                self.journal.append(now, Direction::Send, reply.clone());
                self.schedule(reply).await;
            } else {
                warn!(src = %message.src, dest = %message.dest, "send from unattached node dropped");
            }
            return;
        }

        let link = self.link_for(&message.src, &message.dest).await;
        if link.partitioned {
            trace!(src = %message.src, dest = %message.dest, "message dropped by partition");
            return;
        }

        self.schedule(message).await;
    }

    async fn schedule(self: &Arc<Self>, message: Message) {
        let link = self.link_for(&message.src, &message.dest).await;
        let latency_ns = self.sample_latency_ns(link.latency_mean_ms, link.latency_jitter_ms).await;
        let deliver_at_ns = self.clock.now_ns() + latency_ns;
        let seq = self.next_seq();
        self.pending.lock().await.push(PendingItem {
            deliver_at_ns,
            seq,
            kind: PendingKind::Message(message),
        });
        self.notify.notify_one();
    }

    /// Re-enqueue `message` for delivery again with an independently drawn
    /// latency, used by the duplicate-injection fault mode.
    pub async fn duplicate(self: &Arc<Self>, message: Message) {
        self.schedule(message).await;
    }

    /// Register a wake-up at linear time `at_ns` on the same queue that
    /// carries pending message deliveries. Used by request timeouts and the
    /// nemesis interval instead of sleeping independently, so a virtual
    /// clock advances uniformly: the pump is the only actor that ever calls
    /// [`Clock::wait_until`] directly, everyone else schedules a timer here
    /// and awaits its firing.
    pub async fn schedule_timer(self: &Arc<Self>, at_ns: u64) -> tokio::sync::oneshot::Receiver<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let seq = self.next_seq();
        self.pending.lock().await.push(PendingItem {
            deliver_at_ns: at_ns,
            seq,
            kind: PendingKind::Timer(tx),
        });
        self.notify.notify_one();
        rx
    }

    /// Convenience for spawning the pump with no way to stop it short of
    /// aborting the returned handle; used by tests and small examples that
    /// don't need a coordinated shutdown.
    pub fn spawn_pump(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_pump(rx).await })
    }

    /// Run the pending-delivery pump until `stop` fires. Intended to be
    /// spawned once per test run by the test runner.
    pub async fn run_pump(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        loop {
            let next_deadline = {
                let pending = self.pending.lock().await;
                pending.peek().map(|item| item.deliver_at_ns)
            };

            match next_deadline {
                None => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = stop.changed() => if *stop.borrow() { return; },
                    }
                }
                Some(deadline) => {
                    tokio::select! {
                        _ = self.clock.wait_until(deadline) => {
                            self.deliver_ready(deadline).await;
                        }
                        _ = self.notify.notified() => {}
                        _ = stop.changed() => if *stop.borrow() { return; },
                    }
                }
            }
        }
    }

    async fn deliver_ready(&self, at_least_ns: u64) {
        let now = self.clock.now_ns().max(at_least_ns);
        loop {
            let item = {
                let mut pending = self.pending.lock().await;
                match pending.peek() {
                    Some(item) if item.deliver_at_ns <= now => pending.pop(),
                    _ => None,
                }
            };
            let Some(item) = item else { break };
            match item.kind {
                PendingKind::Timer(tx) => {
                    let _ = tx.send(());
                }
                PendingKind::Message(message) => {
                    let inboxes = self.inboxes.lock().await;
                    if let Some(tx) = inboxes.get(&message.dest) {
                        self.journal.append(now, Direction::Recv, message.clone());
                        if tx.send(message).is_err() {
                            debug!("inbox closed before delivery");
                        }
                    } else {
                        debug!(dest = %message.dest, "dropping message for detached node");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    #[tokio::test]
    async fn partitioned_link_drops_silently() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let net = NetworkCore::new(clock, journal.clone(), NetworkConfig::default());
        let mut rx_a = net.attach("n1").await;
        let mut rx_b = net.attach("n2").await;
        let _ = &mut rx_a;

        net.set_partitioned("n1", "n2", true).await;
        net.send(Message::new("n1", "n2", serde_json::json!({"type": "echo"}))).await;

        assert!(rx_b.try_recv().is_err());
        assert_eq!(journal.len(), 1);
    }

    /// §8's partition-symmetry property: partitioning only `a -> b` drops
    /// sends from `a` but leaves `b -> a` deliverable.
    #[tokio::test]
    async fn one_way_partition_drops_only_the_partitioned_direction() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let net = NetworkCore::new(clock, journal, NetworkConfig::default());
        let stop_tx = tokio::sync::watch::channel(false).0;
        let mut rx_a = net.attach("n1").await;
        let mut rx_b = net.attach("n2").await;
        let pump = tokio::spawn(net.clone().run_pump(stop_tx.subscribe()));

        net.set_partitioned("n1", "n2", true).await;
        net.send(Message::new("n1", "n2", serde_json::json!({"type": "echo"}))).await;
        net.send(Message::new("n2", "n1", serde_json::json!({"type": "echo"}))).await;

        assert!(rx_b.try_recv().is_err());
        let reply = tokio::time::timeout(std::time::Duration::from_secs(1), rx_a.recv())
            .await
            .expect("reply before timeout")
            .expect("channel open");
        assert_eq!(reply.src, "n2");

        stop_tx.send(true).ok();
        pump.abort();
    }

    #[tokio::test]
    async fn unknown_destination_synthesizes_error() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let net = NetworkCore::new(clock.clone(), journal, NetworkConfig::default());
        let stop_tx = tokio::sync::watch::channel(false).0;
        let mut rx = net.attach("n1").await;
        let pump = tokio::spawn(net.clone().run_pump(stop_tx.subscribe()));

        net.send(Message::new(
            "n1",
            "n999",
            serde_json::json!({"type": "echo", "msg_id": 42}),
        ))
        .await;

        let reply = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("reply before timeout")
            .expect("channel open");
        assert_eq!(reply.body["type"], "error");
        assert_eq!(reply.body["code"], 1);
        assert_eq!(reply.body["in_reply_to"], 42);
        assert_eq!(reply.src, "n999");

        stop_tx.send(true).ok();
        pump.abort();
    }
}

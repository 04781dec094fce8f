//! # Fault Scheduler ("Nemesis")
//!
//! A periodic actor, logically no different from a client: it wakes on a
//! timer scheduled on the network core's pending-delivery queue, mutates
//! link or process state, and logs the transition as an operation on a
//! distinguished `:nemesis` process so the checker can correlate faults with
//! anomalies. Every kind besides [`NemesisKind::None`] alternates between a
//! "fire" and a settle step rather than picking a fresh random action each
//! tick, matching the small state machine the design calls for.

use crate::clock::Clock;
use crate::init;
use crate::journal::{History, OpKind};
use crate::message::NodeId;
use crate::network::NetworkCore;
use crate::node::NodeSupervisor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub const NEMESIS_PROCESS: &str = ":nemesis";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NemesisKind {
    None,
    Partition,
    Pause,
    Kill,
}

impl FromStr for NemesisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "partition" => Ok(Self::Partition),
            "pause" => Ok(Self::Pause),
            "kill" => Ok(Self::Kill),
            other => Err(format!("unknown nemesis kind {other:?} (expected none, partition, pause, or kill)")),
        }
    }
}

impl fmt::Display for NemesisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Partition => "partition",
            Self::Pause => "pause",
            Self::Kill => "kill",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct NemesisConfig {
    pub kind: NemesisKind,
    pub interval: Duration,
    pub init_timeout: Duration,
}

/// Alternates `healed`/`partitioned` (partition), picks one node to toggle
/// (pause), or restarts one node (kill). `None` just idles on its interval so
/// the history still shows the nemesis process was present but inert.
enum PhaseState {
    Healed,
    Partitioned,
}

/// Run until `stop` fires. `nodes` is only consulted by `pause`/`kill`;
/// `partition` only needs their ids, already present in `all_node_ids`.
pub async fn run_nemesis(
    network: Arc<NetworkCore>,
    clock: Arc<dyn Clock>,
    history: Arc<History>,
    nodes: Vec<Arc<NodeSupervisor>>,
    all_node_ids: Vec<NodeId>,
    config: NemesisConfig,
    seed: u64,
    mut stop: watch::Receiver<bool>,
) {
    if config.kind == NemesisKind::None || all_node_ids.len() < 2 {
        return;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut phase = PhaseState::Healed;
    let mut paused_node: Option<Arc<NodeSupervisor>> = None;
    let interval_ns = config.interval.as_nanos() as u64;

    loop {
        if *stop.borrow() {
            break;
        }
        let deadline_ns = clock.now_ns() + interval_ns;
        let mut timer = network.schedule_timer(deadline_ns).await;
        tokio::select! {
            _ = &mut timer => {}
            _ = stop.changed() => if *stop.borrow() { break; },
        }
        if *stop.borrow() {
            break;
        }

        match config.kind {
            NemesisKind::None => {}
            NemesisKind::Partition => {
                phase = fire_partition(&network, &history, clock.now_ns(), &all_node_ids, phase, &mut rng).await;
            }
            NemesisKind::Pause => {
                paused_node = fire_pause(&history, clock.now_ns(), &nodes, paused_node, &mut rng).await;
            }
            NemesisKind::Kill => {
                fire_kill(&network, &history, clock.now_ns(), &nodes, &all_node_ids, &config, &mut rng).await;
            }
        }
    }

    if matches!(config.kind, NemesisKind::Partition) {
        network.heal_all().await;
    }
    if let Some(node) = paused_node {
        let _ = node.resume().await;
    }
}

async fn fire_partition(
    network: &Arc<NetworkCore>,
    history: &Arc<History>,
    now_ns: u64,
    all_node_ids: &[NodeId],
    phase: PhaseState,
    rng: &mut StdRng,
) -> PhaseState {
    match phase {
        PhaseState::Healed => {
            let mut shuffled = all_node_ids.to_vec();
            for i in (1..shuffled.len()).rev() {
                let j = rng.gen_range(0..=i);
                shuffled.swap(i, j);
            }
            let split = (shuffled.len() / 2).max(1);
            let (majority, minority) = shuffled.split_at(split);

            history.append(NEMESIS_PROCESS, now_ns, OpKind::Invoke, "partition", serde_json::json!({}));
            for a in majority {
                for b in minority {
                    network.set_partitioned(a, b, true).await;
                    network.set_partitioned(b, a, true).await;
                }
            }
            history.append(
                NEMESIS_PROCESS,
                now_ns,
                OpKind::Info,
                "partition",
                serde_json::json!({"majority": majority, "minority": minority}),
            );
            info!(?majority, ?minority, "nemesis: partitioned cluster");
            PhaseState::Partitioned
        }
        PhaseState::Partitioned => {
            history.append(NEMESIS_PROCESS, now_ns, OpKind::Invoke, "heal", serde_json::json!({}));
            network.heal_all().await;
            history.append(NEMESIS_PROCESS, now_ns, OpKind::Info, "heal", serde_json::json!({}));
            info!("nemesis: healed partition");
            PhaseState::Healed
        }
    }
}

async fn fire_pause(
    history: &Arc<History>,
    now_ns: u64,
    nodes: &[Arc<NodeSupervisor>],
    paused_node: Option<Arc<NodeSupervisor>>,
    rng: &mut StdRng,
) -> Option<Arc<NodeSupervisor>> {
    if let Some(node) = paused_node {
        history.append(
            NEMESIS_PROCESS,
            now_ns,
            OpKind::Invoke,
            "resume",
            serde_json::json!({"node": node.node_id()}),
        );
        let _ = node.resume().await;
        history.append(
            NEMESIS_PROCESS,
            now_ns,
            OpKind::Info,
            "resume",
            serde_json::json!({"node": node.node_id()}),
        );
        info!(node = node.node_id(), "nemesis: resumed node");
        None
    } else if let Some(node) = nodes.get(rng.gen_range(0..nodes.len())) {
        history.append(
            NEMESIS_PROCESS,
            now_ns,
            OpKind::Invoke,
            "pause",
            serde_json::json!({"node": node.node_id()}),
        );
        let _ = node.pause().await;
        history.append(
            NEMESIS_PROCESS,
            now_ns,
            OpKind::Info,
            "pause",
            serde_json::json!({"node": node.node_id()}),
        );
        info!(node = node.node_id(), "nemesis: paused node");
        Some(Arc::clone(node))
    } else {
        None
    }
}

async fn fire_kill(
    network: &Arc<NetworkCore>,
    history: &Arc<History>,
    now_ns: u64,
    nodes: &[Arc<NodeSupervisor>],
    all_node_ids: &[NodeId],
    config: &NemesisConfig,
    rng: &mut StdRng,
) {
    if nodes.is_empty() {
        return;
    }
    let victim = &nodes[rng.gen_range(0..nodes.len())];
    history.append(
        NEMESIS_PROCESS,
        now_ns,
        OpKind::Invoke,
        "kill",
        serde_json::json!({"node": victim.node_id()}),
    );

    match victim.restart(network.clone(), Duration::from_secs(1)).await {
        Ok(()) => {
            let node_id = victim.node_id().to_string();
            match init::initialize_node(network, &node_id, all_node_ids, config.init_timeout).await {
                Ok(()) => {
                    history.append(NEMESIS_PROCESS, now_ns, OpKind::Info, "kill", serde_json::json!({"node": node_id}));
                    info!(node = %node_id, "nemesis: killed and re-initialized node");
                }
                Err(e) => {
                    history.append(
                        NEMESIS_PROCESS,
                        now_ns,
                        OpKind::Fail,
                        "kill",
                        serde_json::json!({"node": node_id, "error": e.to_string()}),
                    );
                    warn!(node = %node_id, error = %e, "nemesis: restarted node failed to re-init");
                }
            }
        }
        Err(e) => {
            history.append(
                NEMESIS_PROCESS,
                now_ns,
                OpKind::Fail,
                "kill",
                serde_json::json!({"node": victim.node_id(), "error": e.to_string()}),
            );
            warn!(node = victim.node_id(), error = %e, "nemesis: restart failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!(NemesisKind::from_str("partition").unwrap(), NemesisKind::Partition);
        assert_eq!(NemesisKind::from_str("kill").unwrap(), NemesisKind::Kill);
        assert!(NemesisKind::from_str("bogus").is_err());
    }

    #[tokio::test]
    async fn none_kind_returns_immediately() {
        use crate::clock::VirtualClock;
        use crate::journal::Journal;
        use crate::network::NetworkConfig;

        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock.clone(), journal, NetworkConfig::default());
        let history = Arc::new(History::new());
        let (_stop_tx, stop_rx) = watch::channel(false);

        let config = NemesisConfig {
            kind: NemesisKind::None,
            interval: Duration::from_secs(1),
            init_timeout: Duration::from_secs(1),
        };
        run_nemesis(network, clock, history.clone(), Vec::new(), vec!["n1".into(), "n2".into()], config, 0, stop_rx).await;
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn partition_alternates_and_heals_on_stop() {
        use crate::clock::VirtualClock;
        use crate::journal::Journal;
        use crate::network::NetworkConfig;

        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock.clone(), journal, NetworkConfig::default());
        network.spawn_pump();
        let history = Arc::new(History::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let config = NemesisConfig {
            kind: NemesisKind::Partition,
            interval: Duration::from_millis(5),
            init_timeout: Duration::from_secs(1),
        };
        let nodes = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
        let handle = tokio::spawn(run_nemesis(network.clone(), clock, history.clone(), Vec::new(), nodes, config, 7, stop_rx));

        tokio::time::sleep(Duration::from_millis(40)).await;
        stop_tx.send(true).ok();
        handle.await.unwrap();

        let snapshot = history.snapshot();
        assert!(snapshot.iter().any(|r| r.process == NEMESIS_PROCESS));
    }
}

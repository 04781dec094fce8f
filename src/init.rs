//! # Initialization Protocol
//!
//! One-shot handshake that tells each user node its id and its peers' ids.
//! Built-in services and clients never go through this: they are
//! initialized internally by their own constructors.

use crate::message::{Message, NodeId};
use crate::network::NetworkCore;
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Every handshake (including re-inits after a nemesis `kill` restart) draws
/// its `msg_id` from this counter rather than hardcoding `1`, since the core
/// re-uses the same `init-<node_id>` handshake src across restarts and
/// `msg_id` must stay unique per source for the life of the run.
static NEXT_INIT_MSG_ID: AtomicU64 = AtomicU64::new(1);

/// Send the synthesized `init` body to `node_id` and wait for its
/// `init_ok` reply. The handshake is addressed from a throwaway pseudo-node
/// (`init-<node_id>`) attached just long enough to receive the correlated
/// reply, since the reply's `dest` is whatever `src` the request carried.
/// Fails with a setup-failure error if no reply arrives within `timeout`.
pub async fn initialize_node(
    network: &Arc<NetworkCore>,
    node_id: &NodeId,
    all_node_ids: &[NodeId],
    timeout: Duration,
) -> Result<()> {
    let handshake_src = format!("init-{node_id}");
    let mut handshake_rx = network.attach(handshake_src.clone()).await;

    let msg_id = NEXT_INIT_MSG_ID.fetch_add(1, Ordering::Relaxed);
    let init_body = serde_json::json!({
        "type": "init",
        "msg_id": msg_id,
        "node_id": node_id,
        "node_ids": all_node_ids,
    });
    network
        .send(Message::new(handshake_src.clone(), node_id.clone(), init_body))
        .await;

    let reply = tokio::time::timeout(timeout, async {
        loop {
            match handshake_rx.recv().await {
                Some(msg) if msg.body_type() == "init_ok" && msg.in_reply_to() == Some(msg_id) => {
                    return Some(msg);
                }
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await;

    network.detach(&handshake_src).await;

    match reply {
        Ok(Some(_)) => {
            info!(node = %node_id, "init handshake complete");
            Ok(())
        }
        Ok(None) => bail!("node {node_id} closed its connection before replying init_ok"),
        Err(_) => bail!("node {node_id} did not reply init_ok within the init timeout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::journal::Journal;
    use crate::network::NetworkConfig;

    #[tokio::test]
    async fn times_out_when_node_never_replies() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());
        let _node_inbox = network.attach("n1").await;
        network.spawn_pump();

        let result = initialize_node(&network, &"n1".to_string(), &["n1".to_string()], Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn succeeds_when_node_replies_init_ok() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());
        let mut node_inbox = network.attach("n1").await;
        network.spawn_pump();

        let responder = network.clone();
        tokio::spawn(async move {
            if let Some(req) = node_inbox.recv().await {
                let in_reply_to = req.msg_id().unwrap_or(0);
                responder
                    .send(Message::new(
                        "n1",
                        req.src.clone(),
                        serde_json::json!({"type": "init_ok", "in_reply_to": in_reply_to}),
                    ))
                    .await;
            }
        });

        let result = initialize_node(&network, &"n1".to_string(), &["n1".to_string()], Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }
}

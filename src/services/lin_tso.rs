//! `lin-tso`: no KV state, exposes a monotonic ticket allocator. `ts` is
//! strictly monotonically increasing across the entire test run — a single
//! `AtomicU64` behind this service's recv loop is sufficient since the loop
//! already serializes every request.

use super::{reply_err, reply_ok, LIN_TSO};
use crate::error::MaelstromError;
use crate::network::NetworkCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

pub fn spawn_lin_tso(network: Arc<NetworkCore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inbox = network.attach(LIN_TSO).await;
        let next_ts = AtomicU64::new(0);

        while let Some(req) = inbox.recv().await {
            let reply = match req.body_type() {
                "ts" => {
                    let ts = next_ts.fetch_add(1, Ordering::SeqCst);
                    reply_ok(&req, serde_json::json!({"type": "ts_ok", "ts": ts}))
                }
                other => reply_err(&req, MaelstromError::not_supported(other)),
            };
            network.send(reply).await;
        }
        warn!("lin-tso inbox closed, service exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::journal::Journal;
    use crate::message::Message;
    use crate::network::NetworkConfig;

    #[tokio::test]
    async fn tickets_strictly_increase() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());
        let mut client_rx = network.attach("c1").await;
        spawn_lin_tso(network.clone());
        network.spawn_pump();

        for i in 0..3u64 {
            network
                .send(Message::new("c1", LIN_TSO, serde_json::json!({"type": "ts", "msg_id": i + 1})))
                .await;
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let reply = client_rx.recv().await.unwrap();
            seen.push(reply.body["ts"].as_u64().unwrap());
        }
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}

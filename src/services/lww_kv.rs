//! `lww-kv`: writes carry an internally assigned monotonic timestamp;
//! concurrent writes resolve by greater timestamp, reads return the value
//! with the largest timestamp observed so far (which may be stale relative
//! to a write still in flight elsewhere).
//!
//! Timestamp ties (two writes landing in the same clock tick) break by the
//! greater `msg_id` of the writing request — see DESIGN.md for why `msg_id`
//! was chosen over node-id as the tie-breaker.

use super::{key_of, reply_err, reply_ok, LWW_KV};
use crate::clock::Clock;
use crate::error::MaelstromError;
use crate::network::NetworkCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone)]
struct Stamped {
    timestamp_ns: u64,
    msg_id: u64,
    value: serde_json::Value,
}

pub fn spawn_lww_kv(network: Arc<NetworkCore>, clock: Arc<dyn Clock>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inbox = network.attach(LWW_KV).await;
        let mut store: HashMap<serde_json::Value, Stamped> = HashMap::new();

        while let Some(req) = inbox.recv().await {
            let msg_id = req.msg_id().unwrap_or(0);
            let reply = match req.body_type() {
                "read" => match key_of(&req) {
                    Ok(key) => match store.get(&key) {
                        Some(entry) => reply_ok(&req, serde_json::json!({"type": "read_ok", "value": entry.value})),
                        None => reply_err(&req, MaelstromError::key_does_not_exist(&key)),
                    },
                    Err(e) => reply_err(&req, e),
                },
                "write" => match key_of(&req) {
                    Ok(key) => {
                        let value = req.body.get("value").cloned().unwrap_or(serde_json::Value::Null);
                        let timestamp_ns = clock.now_ns();
                        let candidate = Stamped { timestamp_ns, msg_id, value };
                        let should_apply = match store.get(&key) {
                            None => true,
                            Some(current) => {
                                (candidate.timestamp_ns, candidate.msg_id) > (current.timestamp_ns, current.msg_id)
                            }
                        };
                        if should_apply {
                            store.insert(key, candidate);
                        }
                        reply_ok(&req, serde_json::json!({"type": "write_ok"}))
                    }
                    Err(e) => reply_err(&req, e),
                },
                "cas" => match key_of(&req) {
                    Ok(key) => {
                        let from = req.body.get("from").cloned().unwrap_or(serde_json::Value::Null);
                        let to = req.body.get("to").cloned().unwrap_or(serde_json::Value::Null);
                        let create_if_not_exists = req
                            .body
                            .get("create_if_not_exists")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        let timestamp_ns = clock.now_ns();
                        match store.get(&key) {
                            Some(current) if current.value == from => {
                                store.insert(key, Stamped { timestamp_ns, msg_id, value: to });
                                reply_ok(&req, serde_json::json!({"type": "cas_ok"}))
                            }
                            Some(_) => reply_err(&req, MaelstromError::precondition_failed("current value does not match 'from'")),
                            None if create_if_not_exists => {
                                store.insert(key, Stamped { timestamp_ns, msg_id, value: to });
                                reply_ok(&req, serde_json::json!({"type": "cas_ok"}))
                            }
                            None => reply_err(&req, MaelstromError::key_does_not_exist(&key)),
                        }
                    }
                    Err(e) => reply_err(&req, e),
                },
                other => reply_err(&req, MaelstromError::not_supported(other)),
            };
            network.send(reply).await;
        }
        warn!("lww-kv inbox closed, service exiting");
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
    async fn later_msg_id_wins_on_timestamp_tie() {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock.clone(), journal, NetworkConfig::default());
        let mut client_rx = network.attach("c1").await;
        spawn_lww_kv(network.clone(), clock);
        network.spawn_pump();

        network
            .send(Message::new("c1", LWW_KV, serde_json::json!({"type": "write", "msg_id": 1, "key": "k", "value": "first"})))
            .await;
        client_rx.recv().await.unwrap();
        network
            .send(Message::new("c1", LWW_KV, serde_json::json!({"type": "write", "msg_id": 2, "key": "k", "value": "second"})))
            .await;
        client_rx.recv().await.unwrap();

        network
            .send(Message::new("c1", LWW_KV, serde_json::json!({"type": "read", "msg_id": 3, "key": "k"})))
            .await;
        let reply = client_rx.recv().await.unwrap();
        assert_eq!(reply.body["value"], "second");
    }
}

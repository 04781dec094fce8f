//! `lin-kv`: every op is atomic and totally ordered against every other op on
//! this service. Implemented as a single-threaded executor behind the
//! service's own recv loop — there is exactly one task draining the inbox,
//! so "totally ordered" falls out of "processed one at a time" rather than
//! requiring any locking.

use super::{key_of, reply_err, reply_ok, LIN_KV};
use crate::error::MaelstromError;
use crate::network::NetworkCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub fn spawn_lin_kv(network: Arc<NetworkCore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inbox = network.attach(LIN_KV).await;
        let mut store: HashMap<serde_json::Value, serde_json::Value> = HashMap::new();

        while let Some(req) = inbox.recv().await {
            let reply = match req.body_type() {
                "read" => match key_of(&req) {
                    Ok(key) => match store.get(&key) {
                        Some(value) => reply_ok(&req, serde_json::json!({"type": "read_ok", "value": value})),
                        None => reply_err(&req, MaelstromError::key_does_not_exist(&key)),
                    },
                    Err(e) => reply_err(&req, e),
                },
                "write" => match key_of(&req) {
                    Ok(key) => {
                        let value = req.body.get("value").cloned().unwrap_or(serde_json::Value::Null);
                        store.insert(key, value);
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
                        match store.get(&key) {
                            Some(current) if *current == from => {
                                store.insert(key, to);
                                reply_ok(&req, serde_json::json!({"type": "cas_ok"}))
                            }
                            Some(_) => reply_err(&req, MaelstromError::precondition_failed("current value does not match 'from'")),
                            None if create_if_not_exists => {
                                store.insert(key, to);
                                reply_ok(&req, serde_json::json!({"type": "cas_ok"}))
                            }
                            None => reply_err(&req, MaelstromError::key_does_not_exist(&key)),
                        }
                    }
                    Err(e) => reply_err(&req, e),
                },
                other => {
                    debug!(op = other, "lin-kv: unsupported op");
                    reply_err(&req, MaelstromError::not_supported(other))
                }
            };
            network.send(reply).await;
        }
        warn!("lin-kv inbox closed, service exiting");
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
    async fn write_then_read_round_trips() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());
        let mut client_rx = network.attach("c1").await;
        spawn_lin_kv(network.clone());
        network.spawn_pump();

        network
            .send(Message::new(
                "c1",
                LIN_KV,
                serde_json::json!({"type": "write", "msg_id": 1, "key": "k", "value": 42}),
            ))
            .await;
        let write_reply = client_rx.recv().await.unwrap();
        assert_eq!(write_reply.body["type"], "write_ok");

        network
            .send(Message::new(
                "c1",
                LIN_KV,
                serde_json::json!({"type": "read", "msg_id": 2, "key": "k"}),
            ))
            .await;
        let read_reply = client_rx.recv().await.unwrap();
        assert_eq!(read_reply.body["type"], "read_ok");
        assert_eq!(read_reply.body["value"], 42);
    }

    #[tokio::test]
    async fn cas_rejects_mismatched_from() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());
        let mut client_rx = network.attach("c1").await;
        spawn_lin_kv(network.clone());
        network.spawn_pump();

        network
            .send(Message::new(
                "c1",
                LIN_KV,
                serde_json::json!({"type": "cas", "msg_id": 1, "key": "k", "from": 0, "to": 1}),
            ))
            .await;
        let reply = client_rx.recv().await.unwrap();
        assert_eq!(reply.body["type"], "error");
        assert_eq!(reply.body["code"], 20);
    }
}

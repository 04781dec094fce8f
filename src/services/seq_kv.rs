//! `seq-kv`: per-key total order but cross-key ops may reorder. Implemented
//! with one lightweight task per key: the dispatcher routes each request to
//! its key's task (spawning one on first touch), so operations on different
//! keys run concurrently while operations sharing a key serialize in the
//! order the dispatcher observed them.

use super::{key_of, reply_err, reply_ok, SEQ_KV};
use crate::error::MaelstromError;
use crate::message::Message;
use crate::network::NetworkCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

enum KeyOp {
    Read { reply_tx: mpsc::UnboundedSender<Result<serde_json::Value, MaelstromError>> },
    Write { value: serde_json::Value, reply_tx: mpsc::UnboundedSender<Result<(), MaelstromError>> },
    Cas {
        from: serde_json::Value,
        to: serde_json::Value,
        create_if_not_exists: bool,
        reply_tx: mpsc::UnboundedSender<Result<(), MaelstromError>>,
    },
}

fn spawn_key_task(key: serde_json::Value) -> mpsc::UnboundedSender<KeyOp> {
    let (tx, mut rx) = mpsc::unbounded_channel::<KeyOp>();
    tokio::spawn(async move {
        let mut value: Option<serde_json::Value> = None;
        while let Some(op) = rx.recv().await {
            match op {
                KeyOp::Read { reply_tx } => {
                    let result = value
                        .clone()
                        .ok_or_else(|| MaelstromError::key_does_not_exist(&key));
                    let _ = reply_tx.send(result);
                }
                KeyOp::Write { value: new_value, reply_tx } => {
                    value = Some(new_value);
                    let _ = reply_tx.send(Ok(()));
                }
                KeyOp::Cas { from, to, create_if_not_exists, reply_tx } => {
                    let result = match &value {
                        Some(current) if *current == from => {
                            value = Some(to);
                            Ok(())
                        }
                        Some(_) => Err(MaelstromError::precondition_failed("current value does not match 'from'")),
                        None if create_if_not_exists => {
                            value = Some(to);
                            Ok(())
                        }
                        None => Err(MaelstromError::key_does_not_exist(&key)),
                    };
                    let _ = reply_tx.send(result);
                }
            }
        }
    });
    tx
}

pub fn spawn_seq_kv(network: Arc<NetworkCore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inbox = network.attach(SEQ_KV).await;
        let mut key_tasks: HashMap<serde_json::Value, mpsc::UnboundedSender<KeyOp>> = HashMap::new();

        while let Some(req) = inbox.recv().await {
            let key = match key_of(&req) {
                Ok(key) => key,
                Err(e) => {
                    network.send(reply_err(&req, e)).await;
                    continue;
                }
            };
            let key_tx = key_tasks
                .entry(key.clone())
                .or_insert_with(|| spawn_key_task(key.clone()))
                .clone();

            let network = Arc::clone(&network);
            let req = req.clone();
            tokio::spawn(async move {
                let reply = match req.body_type() {
                    "read" => {
                        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
                        key_tx.send(KeyOp::Read { reply_tx }).ok();
                        match reply_rx.recv().await {
                            Some(Ok(value)) => reply_ok(&req, serde_json::json!({"type": "read_ok", "value": value})),
                            Some(Err(e)) => reply_err(&req, e),
                            None => reply_err(&req, MaelstromError::temporarily_unavailable("key task gone")),
                        }
                    }
                    "write" => {
                        let value = req.body.get("value").cloned().unwrap_or(serde_json::Value::Null);
                        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
                        key_tx.send(KeyOp::Write { value, reply_tx }).ok();
                        match reply_rx.recv().await {
                            Some(Ok(())) => reply_ok(&req, serde_json::json!({"type": "write_ok"})),
                            Some(Err(e)) => reply_err(&req, e),
                            None => reply_err(&req, MaelstromError::temporarily_unavailable("key task gone")),
                        }
                    }
                    "cas" => {
                        let from = req.body.get("from").cloned().unwrap_or(serde_json::Value::Null);
                        let to = req.body.get("to").cloned().unwrap_or(serde_json::Value::Null);
                        let create_if_not_exists = req
                            .body
                            .get("create_if_not_exists")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
                        key_tx
                            .send(KeyOp::Cas { from, to, create_if_not_exists, reply_tx })
                            .ok();
                        match reply_rx.recv().await {
                            Some(Ok(())) => reply_ok(&req, serde_json::json!({"type": "cas_ok"})),
                            Some(Err(e)) => reply_err(&req, e),
                            None => reply_err(&req, MaelstromError::temporarily_unavailable("key task gone")),
                        }
                    }
                    other => reply_err(&req, MaelstromError::not_supported(other)),
                };
                network.send(reply).await;
            });
        }
        warn!("seq-kv inbox closed, service exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::journal::Journal;
    use crate::network::NetworkConfig;

    #[tokio::test]
    async fn independent_keys_both_succeed() {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(VirtualClock::new());
        let journal = Arc::new(Journal::new());
        let network = NetworkCore::new(clock, journal, NetworkConfig::default());
        let mut client_rx = network.attach("c1").await;
        spawn_seq_kv(network.clone());
        network.spawn_pump();

        network
            .send(Message::new("c1", SEQ_KV, serde_json::json!({"type": "write", "msg_id": 1, "key": "a", "value": 1})))
            .await;
        network
            .send(Message::new("c1", SEQ_KV, serde_json::json!({"type": "write", "msg_id": 2, "key": "b", "value": 2})))
            .await;

        let r1 = client_rx.recv().await.unwrap();
        let r2 = client_rx.recv().await.unwrap();
        assert_eq!(r1.body["type"], "write_ok");
        assert_eq!(r2.body["type"], "write_ok");
    }
}

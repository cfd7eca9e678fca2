//! `WS /events` (spec §4.7, §6): subscribe/unsubscribe protocol over the
//! Event Bus. A connection must present a token that resolves to an
//! internal id before any `subscribe` op is accepted.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use raidcore_agent::SubscriptionId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::state::AppState;

/// Spec §5: a WebSocket write that hasn't completed within this long is
/// treated as a dropped event for that subscription, not a dead connection.
const EVENT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientOp {
    Subscribe { topic: String },
    Unsubscribe { subscription_id: u64 },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ServerMessage {
    Event { event: String, topic: String, payload: serde_json::Value },
    Error { error: String },
}

pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<EventsQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

const FORWARD_QUEUE_DEPTH: usize = 256;

async fn handle_socket(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        let _ = socket
            .send(Message::Text(serde_json::to_string(&ServerMessage::Error { error: "missing token".to_string() }).unwrap()))
            .await;
        let _ = socket.close().await;
        return;
    };

    let conn_id = Uuid::new_v4().to_string();
    // The token *is* the internal id in this workspace's simplified auth
    // model; real platform-token exchange is out of scope (spec §1).
    tracing::info!(conn_id = %conn_id, internal_id = %token, "websocket connected");

    let (forward_tx, mut forward_rx) = mpsc::channel::<ServerMessage>(FORWARD_QUEUE_DEPTH);
    let mut forwarders: Vec<(u64, tokio::task::JoinHandle<()>)> = Vec::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientOp>(&text) {
                            Ok(ClientOp::Subscribe { topic }) => {
                                let handle = state.bus.subscribe(&conn_id, &topic);
                                let id = handle.id.value();
                                let mut receiver = handle.receiver;
                                let tx = forward_tx.clone();
                                let join = tokio::spawn(async move {
                                    while let Some(event) = receiver.recv().await {
                                        let topic = event.topic.clone();
                                        let msg = ServerMessage::Event { event: event.event, topic: event.topic, payload: event.payload };
                                        match timeout(EVENT_WRITE_TIMEOUT, tx.send(msg)).await {
                                            Ok(Ok(())) => {}
                                            Ok(Err(_)) => break,
                                            Err(_elapsed) => {
                                                tracing::warn!(topic = %topic, "event dropped: forwarder queue write timed out");
                                            }
                                        }
                                    }
                                });
                                forwarders.push((id, join));
                            }
                            Ok(ClientOp::Unsubscribe { subscription_id }) => {
                                state.bus.unsubscribe(SubscriptionId::from(subscription_id));
                                if let Some(pos) = forwarders.iter().position(|(id, _)| *id == subscription_id) {
                                    forwarders.swap_remove(pos).1.abort();
                                }
                            }
                            Err(e) => {
                                let msg = ServerMessage::Error { error: format!("malformed op: {e}") };
                                if socket.send(Message::Text(serde_json::to_string(&msg).unwrap())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            Some(msg) = forward_rx.recv() => {
                let text = serde_json::to_string(&msg).unwrap_or_default();
                match timeout(EVENT_WRITE_TIMEOUT, socket.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => break,
                    Err(_elapsed) => {
                        tracing::warn!(conn_id = %conn_id, "event dropped: websocket write timed out");
                    }
                }
            }
        }
    }

    for (_, join) in forwarders {
        join.abort();
    }
    state.bus.close(&conn_id);
    tracing::info!(conn_id = %conn_id, "websocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_op_parses_from_wire_shape() {
        let op: ClientOp = serde_json::from_str(r#"{"op":"subscribe","topic":"session:abc"}"#).unwrap();
        assert!(matches!(op, ClientOp::Subscribe { topic } if topic == "session:abc"));
    }

    #[test]
    fn unsubscribe_op_parses_from_wire_shape() {
        let op: ClientOp = serde_json::from_str(r#"{"op":"unsubscribe","subscription_id":7}"#).unwrap();
        assert!(matches!(op, ClientOp::Unsubscribe { subscription_id: 7 }));
    }

    #[test]
    fn malformed_op_is_rejected() {
        assert!(serde_json::from_str::<ClientOp>(r#"{"op":"nonsense"}"#).is_err());
    }
}

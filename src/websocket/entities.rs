use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, timeout, Duration};

use crate::{
    api::AppState,
    constants::{WS_CLIENT_TIMEOUT_SECS, WS_HEARTBEAT_INTERVAL_SECS},
    store::{Entity, EntityId, EntityStore},
};

fn connected_payload() -> String {
    serde_json::json!({
        "type": "connected",
        "message": "Connected to entity stream"
    })
    .to_string()
}

#[derive(Debug, Deserialize)]
struct SubscribeMessage {
    #[serde(rename = "type")]
    msg_type: String,
    entity_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EntityUpdate {
    #[serde(rename = "type")]
    msg_type: &'static str,
    version: u64,
    entities: Vec<Entity>,
    missing: Vec<EntityId>,
}

// Internal helper that snapshots the subscribed entities from the merged view.
fn snapshot(store: &EntityStore, ids: &BTreeSet<EntityId>, version: u64) -> EntityUpdate {
    let mut entities = Vec::new();
    let mut missing = Vec::new();
    for id in ids {
        match store.get_entity(id) {
            Some(entity) => entities.push(entity),
            None => missing.push(*id),
        }
    }
    EntityUpdate {
        msg_type: "entity_update",
        version,
        entities,
        missing,
    }
}

/// WebSocket handler streaming entity changes, optimistic overlays included.
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let subscribed: Arc<RwLock<BTreeSet<EntityId>>> = Arc::new(RwLock::new(BTreeSet::new()));
    let subscribed_clone = subscribed.clone();
    let (resend_tx, mut resend_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    let _ = sender.send(Message::Text(connected_payload().into())).await;

    let store = state.store.clone();
    let mut changes = store.subscribe();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval(Duration::from_secs(WS_HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    continue;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                resend = resend_rx.recv() => {
                    if resend.is_none() {
                        break;
                    }
                }
            }

            let version = *changes.borrow_and_update();
            let ids = subscribed_clone.read().await.clone();
            if ids.is_empty() {
                continue;
            }
            let update = snapshot(&store, &ids, version.version);
            let json = serde_json::to_string(&update).unwrap_or_default();
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            if version.closed {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        loop {
            let next_msg =
                timeout(Duration::from_secs(WS_CLIENT_TIMEOUT_SECS), receiver.next()).await;
            let msg = match next_msg {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {
                    tracing::info!("Entity stream client timeout");
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    let Ok(subscribe) = serde_json::from_str::<SubscribeMessage>(&text) else {
                        continue;
                    };
                    if subscribe.msg_type != "subscribe" {
                        continue;
                    }
                    let mut ids = subscribed.write().await;
                    for raw in subscribe.entity_ids {
                        match raw.parse::<EntityId>() {
                            Ok(id) => {
                                ids.insert(id);
                            }
                            Err(e) => tracing::debug!("Ignoring entity id {}: {}", raw, e),
                        }
                    }
                    tracing::info!("Entity stream subscribed to {} entities", ids.len());
                    let _ = resend_tx.send(());
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!("Entity WebSocket connection closed");
}

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

use crate::{
    api::AppState,
    constants::{DEFAULT_PAGE_LIMIT, WS_CLIENT_TIMEOUT_SECS},
    error::Result,
    indexer::{BudokanQueries, GuardedFetcher, PhaseFilter, QueryState, SqlClient},
    utils::ensure_page_limit,
};

fn connected_payload() -> String {
    serde_json::json!({
        "type": "connected",
        "message": "Connected to tournament query stream"
    })
    .to_string()
}

#[derive(Debug, Deserialize)]
struct QueryMessage {
    #[serde(rename = "type")]
    msg_type: String,
    phase: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Serialize)]
struct QueryStateMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(flatten)]
    state: &'a QueryState,
}

// Internal helper that turns a client message into SQL; `None` clears the view.
fn build_query(
    queries: &BudokanQueries,
    msg: &QueryMessage,
    now: u64,
    page_limit_max: u32,
) -> Result<Option<String>> {
    if msg.msg_type == "clear" {
        return Ok(None);
    }
    let phase: PhaseFilter = msg.phase.as_deref().unwrap_or("all").parse()?;
    let limit = msg.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    ensure_page_limit(limit, page_limit_max)?;
    Ok(Some(queries.tournaments(phase, now, limit, msg.offset.unwrap_or(0))))
}

/// WebSocket handler for live tournament lists.
///
/// Each `query` message supersedes the previous one; only the newest query's
/// result is ever pushed to the client.
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let fetcher: Arc<GuardedFetcher<SqlClient>> = Arc::new(GuardedFetcher::new(state.sql.clone()));
    let mut states = fetcher.subscribe();

    let _ = sender.send(Message::Text(connected_payload().into())).await;

    let mut send_task = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let json = {
                let current = states.borrow_and_update();
                serde_json::to_string(&QueryStateMessage {
                    msg_type: "query_state",
                    state: &*current,
                })
                .unwrap_or_default()
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_fetcher = fetcher.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut in_flight: Option<tokio::task::JoinHandle<()>> = None;
        loop {
            let next_msg =
                timeout(Duration::from_secs(WS_CLIENT_TIMEOUT_SECS), receiver.next()).await;
            let msg = match next_msg {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {
                    tracing::info!("Tournament stream client timeout");
                    break;
                }
            };
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(query) = serde_json::from_str::<QueryMessage>(&text) else {
                continue;
            };
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            match build_query(&state.queries, &query, now, state.config.page_limit_max) {
                Ok(sql) => {
                    // An interrupted fetch must re-run even if the query text repeats.
                    let interrupted = in_flight.take().is_some_and(|previous| {
                        let running = !previous.is_finished();
                        previous.abort();
                        running
                    });
                    let fetcher = recv_fetcher.clone();
                    in_flight = Some(tokio::spawn(async move {
                        if interrupted {
                            fetcher.execute(sql.as_deref()).await;
                        } else {
                            fetcher.set_query(sql.as_deref()).await;
                        }
                    }));
                }
                Err(e) => tracing::debug!("Rejected tournament query: {}", e),
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

    fetcher.invalidate();
    tracing::info!("Tournament WebSocket connection closed");
}

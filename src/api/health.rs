use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;
use crate::indexer::SqlTransport;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub indexer: String,
    pub store_version: u64,
    pub pending_transactions: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let indexer_status = match state.sql.query("SELECT 1 AS ok").await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            tracing::warn!("Indexer health check failed: {}", e);
            "disconnected".to_string()
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexer: indexer_status,
        store_version: state.store.version().version,
        pending_transactions: state.store.pending_transactions().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;

    #[tokio::test]
    async fn health_reports_disconnected_indexer() {
        let Json(response) = health_check(State(test_state())).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.indexer, "disconnected");
        assert_eq!(response.pending_transactions, 0);
    }
}

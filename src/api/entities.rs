use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AppState;
use crate::{
    error::{AppError, Result},
    models::ApiResponse,
    services::FieldPredicate,
    store::{Entity, EntityDraft, EntityId, TransactionId},
};

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub transaction_id: Option<TransactionId>,
    pub drafts: Vec<EntityDraft>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
}

#[derive(Debug, Deserialize)]
pub struct WaitRequest {
    pub entity_id: EntityId,
    pub predicate: FieldPredicate,
    pub timeout_ms: Option<u64>,
}

/// GET /api/v1/entities/{entity_id}
pub async fn get_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<ApiResponse<Entity>>> {
    let entity_id: EntityId = entity_id.parse()?;
    let entity = state
        .store
        .get_entity(&entity_id)
        .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))?;
    Ok(Json(ApiResponse::success(entity)))
}

/// POST /api/v1/optimistic
pub async fn apply_update(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<ApiResponse<TransactionResponse>>> {
    if req.drafts.is_empty() {
        return Err(AppError::BadRequest("drafts must not be empty".to_string()));
    }
    let transaction_id = match req.transaction_id {
        Some(id) => {
            state.optimistic.apply_with_id(id, req.drafts);
            id
        }
        None => state.optimistic.apply(req.drafts),
    };
    Ok(Json(ApiResponse::success(TransactionResponse { transaction_id })))
}

/// POST /api/v1/optimistic/{tx_id}/confirm
pub async fn confirm_update(
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> Result<Json<ApiResponse<TransactionResponse>>> {
    let transaction_id: TransactionId = tx_id.parse()?;
    state.optimistic.confirm(transaction_id)?;
    Ok(Json(ApiResponse::success(TransactionResponse { transaction_id })))
}

/// POST /api/v1/optimistic/{tx_id}/revert
pub async fn revert_update(
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> Result<Json<ApiResponse<TransactionResponse>>> {
    let transaction_id: TransactionId = tx_id.parse()?;
    state.optimistic.revert(transaction_id)?;
    Ok(Json(ApiResponse::success(TransactionResponse { transaction_id })))
}

/// POST /api/v1/optimistic/wait
pub async fn wait_for_confirmation(
    State(state): State<AppState>,
    Json(req): Json<WaitRequest>,
) -> Result<Json<ApiResponse<Entity>>> {
    let max = Duration::from_secs(state.config.confirmation_timeout_secs);
    let timeout = req
        .timeout_ms
        .map(Duration::from_millis)
        .map_or(max, |requested| requested.min(max));
    let predicate = req.predicate;
    let entity = state
        .optimistic
        .wait_for_confirmation(req.entity_id, |entity| predicate.matches(entity), Some(timeout))
        .await?;
    Ok(Json(ApiResponse::success(entity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use serde_json::json;

    fn apply_request(transaction_id: Option<&str>) -> ApplyRequest {
        let mut body = json!({
            "drafts": [{
                "entity_id": "0x10",
                "namespace": "budokan_1_0_7",
                "model": "EntryCount",
                "fields": {"count": 2}
            }]
        });
        if let Some(id) = transaction_id {
            body["transaction_id"] = json!(id);
        }
        serde_json::from_value(body).expect("request")
    }

    #[tokio::test]
    async fn apply_then_revert_round_trip() {
        let state = test_state();
        let Json(applied) = apply_update(State(state.clone()), Json(apply_request(None)))
            .await
            .expect("apply");
        let tx = applied.data.transaction_id;

        let Json(entity) = get_entity(State(state.clone()), Path("0x10".to_string()))
            .await
            .expect("entity visible");
        assert_eq!(entity.data.entity_id.to_string().len(), 66);

        revert_update(State(state.clone()), Path(tx.to_string()))
            .await
            .expect("revert");
        assert!(matches!(
            get_entity(State(state.clone()), Path("0x10".to_string())).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            confirm_update(State(state), Path(tx.to_string())).await,
            Err(AppError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn apply_rejects_empty_drafts() {
        let req = ApplyRequest {
            transaction_id: None,
            drafts: Vec::new(),
        };
        assert!(matches!(
            apply_update(State(test_state()), Json(req)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn wait_times_out_within_configured_cap() {
        let req: WaitRequest = serde_json::from_value(json!({
            "entity_id": "0x10",
            "predicate": {
                "namespace": "budokan_1_0_7",
                "model": "EntryCount",
                "field": "count",
                "equals": 1
            },
            "timeout_ms": 20
        }))
        .expect("request");
        let result = wait_for_confirmation(State(test_state()), Json(req)).await;
        assert!(matches!(result, Err(AppError::ConfirmationTimeout { waited_ms: 20, .. })));
    }

    #[tokio::test]
    async fn confirm_rejects_malformed_id() {
        let result = confirm_update(State(test_state()), Path("nope".to_string())).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}

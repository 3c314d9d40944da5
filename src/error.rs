use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Indexer request failed: {0}")]
    Transport(String),

    #[error("Indexer protocol error: {0}")]
    Protocol(String),

    #[error("Malformed indexer response: {0}")]
    MalformedResponse(String),

    #[error("External API error: {0}")]
    ExternalAPI(String),

    #[error("Timed out after {waited_ms}ms waiting for entity {entity_id}")]
    ConfirmationTimeout { entity_id: String, waited_ms: u64 },

    #[error("Entity store has been shut down")]
    StoreClosed,

    #[error("Unknown or finalized transaction: {0}")]
    UnknownTransaction(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    // Internal helper that maps an error onto its HTTP status and stable code.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Transport(_) => (StatusCode::BAD_GATEWAY, "INDEXER_UNAVAILABLE"),
            AppError::Protocol(_) => (StatusCode::BAD_GATEWAY, "INDEXER_PROTOCOL_ERROR"),
            AppError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, "INDEXER_MALFORMED"),
            AppError::ExternalAPI(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_API_ERROR"),
            AppError::ConfirmationTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "CONFIRMATION_TIMEOUT")
            }
            AppError::StoreClosed => (StatusCode::SERVICE_UNAVAILABLE, "STORE_CLOSED"),
            AppError::UnknownTransaction(_) => (StatusCode::CONFLICT, "UNKNOWN_TRANSACTION"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let details = match &self {
            AppError::ConfirmationTimeout {
                entity_id,
                waited_ms,
            } => Some(serde_json::json!({
                "entity_id": entity_id,
                "waited_ms": waited_ms,
            })),
            _ => None,
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = AppError::ConfirmationTimeout {
            entity_id: "0x1".to_string(),
            waited_ms: 250,
        };
        assert_eq!(err.status_and_code().0, StatusCode::GATEWAY_TIMEOUT);
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn unknown_transaction_is_conflict() {
        let response = AppError::UnknownTransaction("abc".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}

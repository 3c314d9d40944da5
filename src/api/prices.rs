use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::{
    error::{AppError, Result},
    models::ApiResponse,
    services::TokenPrices,
};

const MAX_TOKENS_PER_REQUEST: usize = 50;

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub tokens: String,
}

// Internal helper that splits the comma separated token list.
fn parse_token_list(raw: &str) -> Result<Vec<String>> {
    let tokens: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return Err(AppError::BadRequest("tokens must not be empty".to_string()));
    }
    if tokens.len() > MAX_TOKENS_PER_REQUEST {
        return Err(AppError::BadRequest(format!(
            "at most {} tokens per request",
            MAX_TOKENS_PER_REQUEST
        )));
    }
    Ok(tokens)
}

/// GET /api/v1/prices?tokens=0x..,0x..
pub async fn get_prices(
    State(state): State<AppState>,
    Query(params): Query<PriceQuery>,
) -> Result<Json<ApiResponse<TokenPrices>>> {
    let tokens = parse_token_list(&params.tokens)?;
    let prices = state.prices.fetch_prices(&tokens).await;
    Ok(Json(ApiResponse::success(prices)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_list_trims_and_rejects_empty() {
        assert_eq!(
            parse_token_list(" 0x1, ,0x2 ").expect("tokens"),
            vec!["0x1".to_string(), "0x2".to_string()]
        );
        assert!(parse_token_list(" , ").is_err());
    }

    #[test]
    fn parse_token_list_caps_request_size() {
        let raw = vec!["0x1"; MAX_TOKENS_PER_REQUEST + 1].join(",");
        assert!(parse_token_list(&raw).is_err());
    }
}

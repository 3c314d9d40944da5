use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{
    constants::DEFAULT_PAGE_LIMIT,
    error::{AppError, Result},
    indexer::{queries::parse_tournament_id, PhaseFilter},
    models::{
        codec::value_to_u64, ApiResponse, LeaderboardRow, PaginatedResponse, PlatformMetricsRow,
        PrizeRow, RegistrationRow, TournamentPhase, TournamentRow,
    },
    utils::ensure_page_limit,
};

#[derive(Debug, Deserialize)]
pub struct TournamentListQuery {
    pub phase: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TournamentView {
    #[serde(flatten)]
    pub tournament: TournamentRow,
    pub phase: TournamentPhase,
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// GET /api/v1/tournaments
pub async fn list_tournaments(
    State(state): State<AppState>,
    Query(params): Query<TournamentListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TournamentView>>>> {
    let phase: PhaseFilter = params.phase.as_deref().unwrap_or("all").parse()?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = params.offset.unwrap_or(0);
    ensure_page_limit(limit, state.config.page_limit_max)?;

    let now = now_secs();
    let rows: Vec<TournamentRow> = state
        .sql
        .query_as(&state.queries.tournaments(phase, now, limit, offset))
        .await?;
    let total = state
        .sql
        .query_as::<serde_json::Value>(&state.queries.tournament_count(phase, now))
        .await?
        .first()
        .and_then(|row| row.get("count"))
        .and_then(value_to_u64)
        .unwrap_or(0);

    let items = rows
        .into_iter()
        .map(|tournament| TournamentView {
            phase: tournament.phase(now),
            tournament,
        })
        .collect();

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        offset,
        limit,
        total,
    })))
}

/// GET /api/v1/tournaments/{id}/leaderboard
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
) -> Result<Json<ApiResponse<LeaderboardRow>>> {
    let tournament_id = parse_tournament_id(&tournament_id)?;
    let leaderboard = state
        .sql
        .query_as::<LeaderboardRow>(&state.queries.leaderboard(tournament_id))
        .await?
        .into_iter()
        .next()
        .unwrap_or(LeaderboardRow {
            tournament_id,
            token_ids: Vec::new(),
        });
    Ok(Json(ApiResponse::success(leaderboard)))
}

/// GET /api/v1/tournaments/{id}/prizes
pub async fn get_prizes(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<PrizeRow>>>> {
    let tournament_id = parse_tournament_id(&tournament_id)?;
    let prizes = state
        .sql
        .query_as(&state.queries.prizes(tournament_id))
        .await?;
    Ok(Json(ApiResponse::success(prizes)))
}

/// GET /api/v1/tournaments/{id}/registrations
pub async fn get_registrations(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<RegistrationRow>>>> {
    let tournament_id = parse_tournament_id(&tournament_id)?;
    let limit = page.limit.unwrap_or(state.config.page_limit_max);
    ensure_page_limit(limit, state.config.page_limit_max)?;
    let registrations = state
        .sql
        .query_as(&state.queries.registrations(tournament_id, limit, page.offset.unwrap_or(0)))
        .await?;
    Ok(Json(ApiResponse::success(registrations)))
}

/// GET /api/v1/metrics/platform
pub async fn get_platform_metrics(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PlatformMetricsRow>>> {
    let metrics = state
        .sql
        .query_as::<PlatformMetricsRow>(&state.queries.platform_metrics())
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("platform metrics not indexed yet".to_string()))?;
    Ok(Json(ApiResponse::success(metrics)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;

    #[tokio::test]
    async fn list_tournaments_rejects_unknown_phase() {
        let result = list_tournaments(
            State(test_state()),
            Query(TournamentListQuery {
                phase: Some("someday".to_string()),
                limit: None,
                offset: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn list_tournaments_rejects_oversized_page() {
        let result = list_tournaments(
            State(test_state()),
            Query(TournamentListQuery {
                phase: None,
                limit: Some(10_000),
                offset: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn leaderboard_rejects_malformed_id() {
        let result = get_leaderboard(State(test_state()), Path("1;DROP".to_string())).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}

use std::str::FromStr;

use crate::error::AppError;
use crate::models::codec::u64_to_indexer_hex;
use crate::store::{ModelKind, Namespace};

/// Tournament list filter, resolved against the current timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseFilter {
    All,
    Upcoming,
    Registration,
    Live,
    Ended,
}

impl FromStr for PhaseFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(PhaseFilter::All),
            "upcoming" => Ok(PhaseFilter::Upcoming),
            "registration" => Ok(PhaseFilter::Registration),
            "live" => Ok(PhaseFilter::Live),
            "ended" => Ok(PhaseFilter::Ended),
            other => Err(AppError::BadRequest(format!("unknown phase '{}'", other))),
        }
    }
}

/// SQL builders for the Budokan world tables.
///
/// Wide integers are stored as zero-padded hex text, so range filters compare
/// against the same rendering.
#[derive(Debug, Clone)]
pub struct BudokanQueries {
    namespace: Namespace,
}

impl BudokanQueries {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn table(&self, kind: &ModelKind) -> String {
        format!("\"{}\"", kind.table_name(&self.namespace))
    }

    fn phase_condition(phase: PhaseFilter, now: u64) -> String {
        let now = u64_to_indexer_hex(now);
        match phase {
            PhaseFilter::All => "1 = 1".to_string(),
            PhaseFilter::Upcoming => format!("t.\"schedule.game.start\" > '{now}'"),
            PhaseFilter::Registration => format!(
                "t.\"schedule.registration.Some.start\" <= '{now}' AND t.\"schedule.registration.Some.end\" > '{now}'"
            ),
            PhaseFilter::Live => format!(
                "t.\"schedule.game.start\" <= '{now}' AND t.\"schedule.game.end\" > '{now}'"
            ),
            PhaseFilter::Ended => format!("t.\"schedule.game.end\" <= '{now}'"),
        }
    }

    /// One page of tournaments with their entry counts, newest first for
    /// finished phases and soonest first otherwise.
    pub fn tournaments(&self, phase: PhaseFilter, now: u64, limit: u32, offset: u32) -> String {
        let order = match phase {
            PhaseFilter::Ended | PhaseFilter::All => "t.\"schedule.game.end\" DESC",
            _ => "t.\"schedule.game.start\" ASC",
        };
        format!(
            "SELECT t.id AS id, t.\"metadata.name\" AS name, t.\"metadata.description\" AS description, \
             t.created_by AS created_by, t.created_at AS created_at, \
             t.\"game_config.address\" AS game_address, t.\"game_config.settings_id\" AS settings_id, \
             t.\"game_config.prize_spots\" AS prize_spots, \
             t.\"schedule.registration.Some.start\" AS registration_start, \
             t.\"schedule.registration.Some.end\" AS registration_end, \
             t.\"schedule.game.start\" AS game_start, t.\"schedule.game.end\" AS game_end, \
             t.\"schedule.submission_duration\" AS submission_duration, \
             e.count AS entry_count \
             FROM {tournaments} t LEFT JOIN {entries} e ON e.tournament_id = t.id \
             WHERE {condition} ORDER BY {order} LIMIT {limit} OFFSET {offset}",
            tournaments = self.table(&ModelKind::Tournament),
            entries = self.table(&ModelKind::EntryCount),
            condition = Self::phase_condition(phase, now),
        )
    }

    pub fn tournament_count(&self, phase: PhaseFilter, now: u64) -> String {
        format!(
            "SELECT COUNT(*) AS count FROM {} t WHERE {}",
            self.table(&ModelKind::Tournament),
            Self::phase_condition(phase, now)
        )
    }

    pub fn leaderboard(&self, tournament_id: u64) -> String {
        format!(
            "SELECT tournament_id, token_ids FROM {} WHERE tournament_id = '{}'",
            self.table(&ModelKind::Leaderboard),
            u64_to_indexer_hex(tournament_id)
        )
    }

    pub fn registrations(&self, tournament_id: u64, limit: u32, offset: u32) -> String {
        format!(
            "SELECT game_address, game_token_id, tournament_id, entry_number, has_submitted, is_banned \
             FROM {} WHERE tournament_id = '{}' ORDER BY entry_number ASC LIMIT {} OFFSET {}",
            self.table(&ModelKind::Registration),
            u64_to_indexer_hex(tournament_id),
            limit,
            offset
        )
    }

    pub fn prizes(&self, tournament_id: u64) -> String {
        format!(
            "SELECT id, tournament_id, payout_position, token_address, token_type, \
             \"token_type.erc20.amount\" AS amount, \"token_type.erc721.id\" AS nft_id, sponsor_address \
             FROM {} WHERE tournament_id = '{}' ORDER BY payout_position ASC",
            self.table(&ModelKind::Prize),
            u64_to_indexer_hex(tournament_id)
        )
    }

    pub fn platform_metrics(&self) -> String {
        format!(
            "SELECT total_tournaments FROM {} LIMIT 1",
            self.table(&ModelKind::PlatformMetrics)
        )
    }

    /// Raw rows of one model table, used to sync entities into the local store.
    pub fn model_rows(&self, kind: &ModelKind, limit: u32) -> String {
        format!(
            "SELECT * FROM {} ORDER BY internal_updated_at DESC LIMIT {}",
            self.table(kind),
            limit
        )
    }
}

/// Parses a tournament id from a path segment (decimal or 0x-hex).
pub fn parse_tournament_id(raw: &str) -> Result<u64, AppError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => raw.parse().ok(),
    };
    parsed.ok_or_else(|| AppError::BadRequest(format!("invalid tournament id '{}'", raw)))
}

use serde::{Deserialize, Serialize};

use super::codec::{flexible_bool, flexible_opt_u64, flexible_u64, flexible_u64_list, short_string};

/// Where a tournament sits in its schedule at a given timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentPhase {
    Scheduled,
    Registration,
    Staging,
    Live,
    Submission,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentRow {
    #[serde(deserialize_with = "flexible_u64")]
    pub id: u64,
    #[serde(deserialize_with = "short_string")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub created_at: u64,
    pub game_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub settings_id: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub prize_spots: u64,
    #[serde(default, deserialize_with = "flexible_opt_u64")]
    pub registration_start: Option<u64>,
    #[serde(default, deserialize_with = "flexible_opt_u64")]
    pub registration_end: Option<u64>,
    #[serde(deserialize_with = "flexible_u64")]
    pub game_start: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub game_end: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub submission_duration: u64,
    #[serde(default, deserialize_with = "flexible_opt_u64")]
    pub entry_count: Option<u64>,
}

impl TournamentRow {
    pub fn submission_end(&self) -> u64 {
        self.game_end.saturating_add(self.submission_duration)
    }

    pub fn phase(&self, now: u64) -> TournamentPhase {
        if now >= self.submission_end() {
            return TournamentPhase::Finalized;
        }
        if now >= self.game_end {
            return TournamentPhase::Submission;
        }
        if now >= self.game_start {
            return TournamentPhase::Live;
        }
        match (self.registration_start, self.registration_end) {
            (Some(start), Some(end)) if now >= start && now < end => TournamentPhase::Registration,
            (Some(_), Some(end)) if now >= end => TournamentPhase::Staging,
            _ => TournamentPhase::Scheduled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    #[serde(deserialize_with = "flexible_u64")]
    pub tournament_id: u64,
    #[serde(deserialize_with = "flexible_u64_list")]
    pub token_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRow {
    pub game_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub game_token_id: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub tournament_id: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub entry_number: u64,
    #[serde(deserialize_with = "flexible_bool")]
    pub has_submitted: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_banned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrizeRow {
    #[serde(deserialize_with = "flexible_u64")]
    pub id: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub tournament_id: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub payout_position: u64,
    pub token_address: String,
    pub token_type: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub nft_id: Option<String>,
    pub sponsor_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMetricsRow {
    #[serde(deserialize_with = "flexible_u64")]
    pub total_tournaments: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tournament(registration: Option<(u64, u64)>) -> TournamentRow {
        TournamentRow {
            id: 1,
            name: "Weekly".to_string(),
            description: None,
            created_by: "0x1".to_string(),
            created_at: 0,
            game_address: "0x2".to_string(),
            settings_id: 1,
            prize_spots: 3,
            registration_start: registration.map(|r| r.0),
            registration_end: registration.map(|r| r.1),
            game_start: 200,
            game_end: 300,
            submission_duration: 50,
            entry_count: None,
        }
    }

    #[test]
    fn phase_follows_schedule() {
        let t = tournament(Some((100, 150)));
        assert_eq!(t.phase(50), TournamentPhase::Scheduled);
        assert_eq!(t.phase(120), TournamentPhase::Registration);
        assert_eq!(t.phase(160), TournamentPhase::Staging);
        assert_eq!(t.phase(250), TournamentPhase::Live);
        assert_eq!(t.phase(320), TournamentPhase::Submission);
        assert_eq!(t.phase(350), TournamentPhase::Finalized);
    }

    #[test]
    fn open_tournament_without_registration_window_is_scheduled_before_start() {
        assert_eq!(tournament(None).phase(150), TournamentPhase::Scheduled);
    }

    #[test]
    fn tournament_row_decodes_indexer_payload() {
        let row: TournamentRow = serde_json::from_value(json!({
            "id": "0x0000000000000001",
            "name": "0x5765656b6c79",
            "description": "A weekly cup",
            "created_by": "0x0abc",
            "created_at": "0x0000000000000064",
            "game_address": "0x0def",
            "settings_id": 2,
            "prize_spots": 3,
            "registration_start": null,
            "registration_end": null,
            "game_start": "0x00000000000000c8",
            "game_end": "0x000000000000012c",
            "submission_duration": "0x0000000000000032",
            "entry_count": "0x0000000000000004"
        }))
        .expect("decode");
        assert_eq!(row.name, "Weekly");
        assert_eq!(row.game_start, 200);
        assert_eq!(row.entry_count, Some(4));
        assert_eq!(row.submission_end(), 350);
    }
}

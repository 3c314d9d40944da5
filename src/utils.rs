// Utility modules

use crate::error::{AppError, Result};
use starknet_core::types::Felt;

/// True when the variable is set to `1`, `true`, `yes` or `on`.
pub fn is_env_flag_enabled(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
        })
        .unwrap_or(false)
}

/// Basic guard for list/query limits to avoid expensive indexer queries.
pub fn ensure_page_limit(limit: u32, configured_max: u32) -> Result<()> {
    let max = configured_max.max(1);
    if limit == 0 || limit > max {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            max
        )));
    }
    Ok(())
}

/// Parses a hex (0x-prefixed) or decimal felt string.
pub fn parse_felt(raw: &str) -> Result<Felt> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest("empty felt value".to_string()));
    }
    let parsed = if value.starts_with("0x") || value.starts_with("0X") {
        Felt::from_hex(value)
    } else {
        Felt::from_dec_str(value)
    };
    parsed.map_err(|_| AppError::BadRequest(format!("invalid felt value: {}", value)))
}

/// Canonical 0x-prefixed, 64-digit hex rendering used by the indexer.
pub fn felt_to_padded_hex(value: &Felt) -> String {
    value.to_fixed_hex_string()
}

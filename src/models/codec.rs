// Deserialization helpers for indexer columns.
//
// The indexer renders small integers as JSON numbers, wide integers (u64 and
// above) and felts as hex strings, booleans as 0/1 and arrays as JSON text.

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use starknet_core::types::Felt;
use starknet_core::utils::parse_cairo_short_string;

/// Reads an integer out of a number, a hex string or a decimal string.
pub fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::Bool(b) => Some(u64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                let digits = hex.trim_start_matches('0');
                if digits.is_empty() {
                    return Some(0);
                }
                u64::from_str_radix(digits, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// Renders a u64 the way the indexer stores it, for lexicographic comparisons.
pub fn u64_to_indexer_hex(value: u64) -> String {
    format!("0x{:016x}", value)
}

pub fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_u64(&value).ok_or_else(|| de::Error::custom(format!("expected integer, got {}", value)))
}

pub fn flexible_opt_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => value_to_u64(&v)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected integer, got {}", v))),
    }
}

pub fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Bool(b) => Ok(*b),
        other => value_to_u64(other)
            .map(|n| n != 0)
            .ok_or_else(|| de::Error::custom(format!("expected boolean, got {}", value))),
    }
}

/// Reads a list of integers out of an array or JSON-array text.
pub fn value_to_u64_list(value: &Value) -> Option<Vec<u64>> {
    let parsed;
    let items = match value {
        Value::Null => return Some(Vec::new()),
        Value::Array(items) => items,
        Value::String(raw) if raw.trim().is_empty() => return Some(Vec::new()),
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).ok()?;
            parsed.as_array()?
        }
        _ => return None,
    };
    items.iter().map(value_to_u64).collect()
}

/// Accepts a JSON array or a string holding a JSON array, of integers.
pub fn flexible_u64_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<u64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_u64_list(&value)
        .ok_or_else(|| de::Error::custom(format!("expected integer array, got {}", value)))
}

/// Decodes a felt252 short string column, falling back to the raw value.
pub fn short_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if !value.starts_with("0x") {
        return Ok(value);
    }
    Ok(Felt::from_hex(&value)
        .ok()
        .and_then(|felt| parse_cairo_short_string(&felt).ok())
        .unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "flexible_u64")]
        id: u64,
        #[serde(default, deserialize_with = "flexible_opt_u64")]
        start: Option<u64>,
        #[serde(deserialize_with = "flexible_bool")]
        flag: bool,
        #[serde(deserialize_with = "flexible_u64_list")]
        ids: Vec<u64>,
        #[serde(deserialize_with = "short_string")]
        name: String,
    }

    #[test]
    fn decodes_indexer_encodings() {
        let probe: Probe = serde_json::from_value(json!({
            "id": "0x000000000000000a",
            "start": null,
            "flag": 1,
            "ids": "[\"0x01\", 2]",
            "name": "0x5765656b6c79",
        }))
        .expect("decode");
        assert_eq!(probe.id, 10);
        assert_eq!(probe.start, None);
        assert!(probe.flag);
        assert_eq!(probe.ids, vec![1, 2]);
        assert_eq!(probe.name, "Weekly");
    }

    #[test]
    fn indexer_hex_is_zero_padded() {
        assert_eq!(u64_to_indexer_hex(255), "0x00000000000000ff");
        assert_eq!(value_to_u64(&json!("0x0000")), Some(0));
        assert_eq!(value_to_u64(&json!("12")), Some(12));
    }
}

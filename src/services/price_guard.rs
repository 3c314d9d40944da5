// Sanity guards for USD prices coming back from the price API.

const MIN_SANE_PRICE_USD: f64 = 0.000_000_01;
const MAX_SANE_PRICE_USD: f64 = 10_000_000.0;

/// Lowercases a token address so duplicate spellings collapse.
pub fn normalize_token(token: &str) -> String {
    token.trim().to_ascii_lowercase()
}

/// Returns the price when it is finite and inside the sane USD range.
pub fn sanitize_price_usd(value: f64) -> Option<f64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    if !(MIN_SANE_PRICE_USD..=MAX_SANE_PRICE_USD).contains(&value) {
        return None;
    }
    Some(value)
}

/// Parses a decimal price string and sanity-checks the result.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().and_then(sanitize_price_usd)
}

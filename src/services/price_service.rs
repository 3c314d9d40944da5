use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::price_guard::{normalize_token, parse_price, sanitize_price_usd};
use crate::constants::EKUBO_PRICE_PERIOD_SECS;
use crate::error::{AppError, Result};

/// Anything that can quote one token against another.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, token: &str, quote_token: &str) -> Result<f64>;
}

/// Ekubo price API client.
#[derive(Debug, Clone)]
pub struct EkuboClient {
    api_url: String,
    client: reqwest::Client,
}

impl EkuboClient {
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            client: reqwest::Client::new(),
        }
    }

    fn price_url(&self, token: &str, quote_token: &str) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/price/{}/{}",
            self.api_url.trim_end_matches('/'),
            token,
            quote_token
        ))
        .map_err(|e| AppError::Internal(format!("Invalid Ekubo URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("period", &EKUBO_PRICE_PERIOD_SECS.to_string());
        Ok(url)
    }
}

// Internal helper that extracts the price from an Ekubo response body.
fn price_from_body(body: &Value) -> Option<f64> {
    match body.get("price")? {
        Value::String(raw) => parse_price(raw),
        Value::Number(n) => n.as_f64().and_then(sanitize_price_usd),
        _ => None,
    }
}

#[async_trait]
impl PriceSource for EkuboClient {
    async fn fetch_price(&self, token: &str, quote_token: &str) -> Result<f64> {
        let url = self.price_url(token, quote_token)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalAPI(format!("Ekubo price request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalAPI(format!(
                "Ekubo price request returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalAPI(format!("Ekubo price parse failed: {}", e)))?;

        price_from_body(&body)
            .ok_or_else(|| AppError::ExternalAPI("Ekubo returned no usable price".to_string()))
    }
}

/// Per-token outcome of a batch price lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenPrices {
    pub prices: BTreeMap<String, f64>,
    pub errors: BTreeMap<String, String>,
}

impl TokenPrices {
    pub fn price(&self, token: &str) -> Option<f64> {
        self.prices.get(&normalize_token(token)).copied()
    }

    pub fn is_available(&self, token: &str) -> bool {
        self.price(token).is_some()
    }
}

/// Fetches many token prices concurrently, each raced against its own timeout,
/// so one slow token never holds back the rest.
pub struct PriceService<S: PriceSource = EkuboClient> {
    source: Arc<S>,
    quote_token: String,
    per_token_timeout: Duration,
}

impl<S: PriceSource> Clone for PriceService<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            quote_token: self.quote_token.clone(),
            per_token_timeout: self.per_token_timeout,
        }
    }
}

impl<S: PriceSource> PriceService<S> {
    pub fn new(source: Arc<S>, quote_token: String, per_token_timeout: Duration) -> Self {
        Self {
            source,
            quote_token: normalize_token(&quote_token),
            per_token_timeout,
        }
    }

    async fn fetch_one(&self, token: String) -> (String, Result<f64>) {
        if token == self.quote_token {
            return (token, Ok(1.0));
        }
        let result = match tokio::time::timeout(
            self.per_token_timeout,
            self.source.fetch_price(&token, &self.quote_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::ExternalAPI(format!(
                "price request timed out after {}ms",
                self.per_token_timeout.as_millis()
            ))),
        };
        (token, result)
    }

    pub async fn fetch_prices(&self, tokens: &[String]) -> TokenPrices {
        let unique: BTreeSet<String> = tokens
            .iter()
            .map(|token| normalize_token(token))
            .filter(|token| !token.is_empty())
            .collect();

        let lookups = unique.into_iter().map(|token| self.fetch_one(token));
        let results = futures_util::future::join_all(lookups).await;

        let mut out = TokenPrices::default();
        for (token, result) in results {
            match result {
                Ok(price) => {
                    out.prices.insert(token, price);
                }
                Err(e) => {
                    tracing::warn!("Price lookup for {} failed: {}", token, e);
                    out.errors.insert(token, e.to_string());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        async fn fetch_price(&self, token: &str, _quote_token: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match token {
                "0xslow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(9.0)
                }
                "0xbroken" => Err(AppError::ExternalAPI("boom".to_string())),
                _ => Ok(2.5),
            }
        }
    }

    fn service() -> (Arc<FakeSource>, PriceService<FakeSource>) {
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
        });
        let service = PriceService::new(source.clone(), "0xUSDC".to_string(), Duration::from_millis(50));
        (source, service)
    }

    #[tokio::test]
    async fn slow_token_times_out_without_blocking_others() {
        let (_, service) = service();
        let prices = service
            .fetch_prices(&["0xslow".to_string(), "0xfast".to_string()])
            .await;

        assert_eq!(prices.price("0xfast"), Some(2.5));
        assert!(!prices.is_available("0xslow"));
        assert!(prices.errors["0xslow"].contains("timed out"));
    }

    #[tokio::test]
    async fn errors_are_reported_per_token() {
        let (_, service) = service();
        let prices = service
            .fetch_prices(&["0xbroken".to_string(), "0xfast".to_string()])
            .await;
        assert!(prices.errors["0xbroken"].contains("boom"));
        assert_eq!(prices.prices.len(), 1);
    }

    #[tokio::test]
    async fn quote_token_and_duplicates_skip_requests() {
        let (source, service) = service();
        let prices = service
            .fetch_prices(&[
                "0xusdc".to_string(),
                "0xFAST".to_string(),
                "0xfast".to_string(),
            ])
            .await;

        assert_eq!(prices.price("0xUSDC"), Some(1.0));
        assert_eq!(prices.price("0xfast"), Some(2.5));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn price_from_body_accepts_string_or_number() {
        assert_eq!(price_from_body(&json!({"price": "0.5"})), Some(0.5));
        assert_eq!(price_from_body(&json!({"price": 3})), Some(3.0));
        assert_eq!(price_from_body(&json!({"price": "NaN"})), None);
        assert_eq!(price_from_body(&json!({})), None);
    }

    #[test]
    fn price_url_includes_period() {
        let client = EkuboClient::new("https://mainnet-api.ekubo.org/".to_string());
        let url = client.price_url("0xabc", "0xdef").expect("url");
        assert_eq!(url.path(), "/price/0xabc/0xdef");
        assert_eq!(url.query(), Some("period=3600"));
    }
}

use serde::Deserialize;
use std::env;

use crate::constants::{
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_EKUBO_API_URL, DEFAULT_ENTITY_SYNC_INTERVAL_SECS,
    DEFAULT_NAMESPACE, DEFAULT_OPTIMISTIC_TTL_SECS, DEFAULT_PAGE_LIMIT_MAX, DEFAULT_PRICE_FETCH_TIMEOUT_MS,
    DEFAULT_SQL_REQUEST_TIMEOUT_SECS, TOKEN_USDC,
};
use crate::utils::is_env_flag_enabled;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Indexer
    pub torii_url: String,
    pub namespace: String,
    pub sql_request_timeout_secs: u64,

    // Entity sync
    pub enable_entity_sync: bool,
    pub entity_sync_interval_secs: u64,

    // Prices
    pub ekubo_api_url: String,
    pub price_quote_token: String,
    pub price_fetch_timeout_ms: u64,

    // Optimistic updates
    pub confirmation_timeout_secs: u64,
    pub optimistic_ttl_secs: u64,

    // API
    pub page_limit_max: u32,
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            torii_url: env::var("TORII_URL")?,
            namespace: env::var("BUDOKAN_NAMESPACE")
                .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string()),
            sql_request_timeout_secs: env::var("SQL_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_SQL_REQUEST_TIMEOUT_SECS.to_string())
                .parse()?,

            enable_entity_sync: env::var("ENABLE_ENTITY_SYNC")
                .map(|_| is_env_flag_enabled("ENABLE_ENTITY_SYNC"))
                .unwrap_or(true),
            entity_sync_interval_secs: env::var("ENTITY_SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| DEFAULT_ENTITY_SYNC_INTERVAL_SECS.to_string())
                .parse()?,

            ekubo_api_url: env::var("EKUBO_API_URL")
                .unwrap_or_else(|_| DEFAULT_EKUBO_API_URL.to_string()),
            price_quote_token: env::var("PRICE_QUOTE_TOKEN")
                .unwrap_or_else(|_| TOKEN_USDC.to_string()),
            price_fetch_timeout_ms: env::var("PRICE_FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_PRICE_FETCH_TIMEOUT_MS.to_string())
                .parse()?,

            confirmation_timeout_secs: env::var("CONFIRMATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_CONFIRMATION_TIMEOUT_SECS.to_string())
                .parse()?,
            optimistic_ttl_secs: env::var("OPTIMISTIC_TTL_SECS")
                .unwrap_or_else(|_| DEFAULT_OPTIMISTIC_TTL_SECS.to_string())
                .parse()?,

            page_limit_max: env::var("PAGE_LIMIT_MAX")
                .unwrap_or_else(|_| DEFAULT_PAGE_LIMIT_MAX.to_string())
                .parse()?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.torii_url.trim().is_empty() {
            anyhow::bail!("TORII_URL is empty");
        }
        url::Url::parse(self.torii_url.trim())
            .map_err(|e| anyhow::anyhow!("TORII_URL is not a valid URL: {}", e))?;
        if self.namespace.trim().is_empty() {
            anyhow::bail!("BUDOKAN_NAMESPACE is empty");
        }
        if self.price_fetch_timeout_ms == 0 {
            anyhow::bail!("PRICE_FETCH_TIMEOUT_MS must be positive");
        }
        if self.confirmation_timeout_secs == 0 {
            anyhow::bail!("CONFIRMATION_TIMEOUT_SECS must be positive");
        }
        if self.optimistic_ttl_secs < self.confirmation_timeout_secs {
            anyhow::bail!("OPTIMISTIC_TTL_SECS must be at least CONFIRMATION_TIMEOUT_SECS");
        }
        if self.entity_sync_interval_secs == 0 {
            anyhow::bail!("ENTITY_SYNC_INTERVAL_SECS must be positive");
        }

        if self.ekubo_api_url.trim().is_empty() {
            tracing::warn!("EKUBO_API_URL is empty; price lookups will fail");
        }
        if self.environment == "production" && self.cors_allowed_origins.trim() == "*" {
            tracing::warn!("Permissive CORS enabled in production");
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(torii_url: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "test".to_string(),
        torii_url: torii_url.to_string(),
        namespace: DEFAULT_NAMESPACE.to_string(),
        sql_request_timeout_secs: 1,
        enable_entity_sync: false,
        entity_sync_interval_secs: 1,
        ekubo_api_url: DEFAULT_EKUBO_API_URL.to_string(),
        price_quote_token: TOKEN_USDC.to_string(),
        price_fetch_timeout_ms: 100,
        confirmation_timeout_secs: 1,
        optimistic_ttl_secs: 2,
        page_limit_max: 50,
        cors_allowed_origins: "*".to_string(),
    }
}

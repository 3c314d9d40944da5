// src/api/mod.rs

pub mod entities;
pub mod health;
pub mod prices;
pub mod tournaments;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::indexer::{BudokanQueries, SqlClient};
use crate::services::{EkuboClient, OptimisticUpdates, PriceService};
use crate::store::{EntityStore, Namespace};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sql: Arc<SqlClient>,
    pub queries: BudokanQueries,
    pub store: Arc<EntityStore>,
    pub optimistic: OptimisticUpdates,
    pub prices: PriceService,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let namespace = Namespace::new(config.namespace.trim());
        let sql = Arc::new(SqlClient::new(
            config.torii_url.trim().to_string(),
            Duration::from_secs(config.sql_request_timeout_secs),
        )?);
        let store = Arc::new(EntityStore::new());
        let optimistic = OptimisticUpdates::new(
            store.clone(),
            namespace.clone(),
            Duration::from_secs(config.confirmation_timeout_secs),
        );
        let prices = PriceService::new(
            Arc::new(EkuboClient::new(config.ekubo_api_url.clone())),
            config.price_quote_token.clone(),
            Duration::from_millis(config.price_fetch_timeout_ms),
        );

        Ok(Self {
            queries: BudokanQueries::new(namespace),
            sql,
            store,
            optimistic,
            prices,
            config,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    AppState::new(crate::config::test_config("http://127.0.0.1:9")).expect("test state")
}

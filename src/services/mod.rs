// All service modules
pub mod entity_sync;
pub mod optimistic;
pub mod price_guard;
pub mod price_service;

// Re-export for convenience
pub use entity_sync::EntitySync;
pub use optimistic::{Confirmation, FieldPredicate, OptimisticUpdates};
pub use price_service::{EkuboClient, PriceService, TokenPrices};

use crate::{
    config::Config, constants::OPTIMISTIC_SWEEP_INTERVAL_SECS, indexer::SqlClient,
    store::EntityStore,
};
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Start all background services
pub async fn start_background_services(
    sql: Arc<SqlClient>,
    store: Arc<EntityStore>,
    queries: crate::indexer::BudokanQueries,
    config: Config,
) {
    tracing::info!("Starting background services...");

    tokio::spawn(sweep_expired_overlays(
        store.clone(),
        Duration::from_secs(config.optimistic_ttl_secs),
        Duration::from_secs(OPTIMISTIC_SWEEP_INTERVAL_SECS),
    ));

    if config.enable_entity_sync {
        let sync = Arc::new(EntitySync::new(
            sql,
            store,
            queries,
            entity_sync::default_synced_models(),
            Duration::from_secs(config.entity_sync_interval_secs),
        ));
        sync.start().await;
    } else {
        tracing::warn!("Entity sync disabled via ENABLE_ENTITY_SYNC");
    }
}

/// Periodically reverts optimistic overlays nobody confirmed or reverted in time.
async fn sweep_expired_overlays(store: Arc<EntityStore>, ttl: Duration, every: Duration) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        if store.version().closed {
            break;
        }
        let expired = store.expire_pending(ttl);
        if !expired.is_empty() {
            tracing::info!("Swept {} abandoned optimistic updates", expired.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityDraft, EntityId, ModelKind, Namespace, TransactionId};
    use starknet_core::types::Felt;

    #[tokio::test]
    async fn sweep_reverts_abandoned_overlay_and_stops_on_shutdown() {
        let store = Arc::new(EntityStore::new());
        let entity_id = EntityId::new(Felt::from(1_u64));
        store.apply_optimistic_update(
            TransactionId::new(),
            vec![EntityDraft::new(entity_id, Namespace::new("budokan_1_0_7"), ModelKind::EntryCount)
                .with_field("count", 1)],
        );

        let sweeper = tokio::spawn(sweep_expired_overlays(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_millis(10),
        ));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.pending_transactions().is_empty());
        assert!(store.get_entity(&entity_id).is_none());

        store.shutdown();
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper stops after shutdown")
            .expect("sweeper task");
    }
}

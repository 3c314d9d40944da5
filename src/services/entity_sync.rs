use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::{
    constants::{ENTITY_SYNC_BACKOFF_MAX_SECS, ENTITY_SYNC_BATCH_LIMIT},
    error::Result,
    indexer::{BudokanQueries, SqlRow, SqlTransport},
    store::{Entity, EntityId, EntityStore, Fields, ModelKind, Namespace},
};

const ENTITY_ID_COLUMN: &str = "internal_entity_id";
const INTERNAL_COLUMN_PREFIX: &str = "internal_";

/// Models mirrored into the local store by default.
pub fn default_synced_models() -> Vec<ModelKind> {
    vec![
        ModelKind::Tournament,
        ModelKind::EntryCount,
        ModelKind::Leaderboard,
        ModelKind::Prize,
        ModelKind::PlatformMetrics,
    ]
}

// Internal helper that supports `sync_backoff_secs` operations.
fn sync_backoff_secs(base_secs: u64, failures: u32) -> u64 {
    let exponent = failures.saturating_sub(1).min(5);
    let multiplier = 1_u64 << exponent;
    let base = base_secs.max(1);
    base.saturating_mul(multiplier)
        .clamp(base, ENTITY_SYNC_BACKOFF_MAX_SECS.max(base))
}

/// Maps raw model rows onto entities; rows without an entity id are skipped.
pub fn rows_to_entities(namespace: &Namespace, kind: &ModelKind, rows: Vec<SqlRow>) -> Vec<Entity> {
    rows.into_iter()
        .filter_map(|row| {
            let entity_id: EntityId = row.get(ENTITY_ID_COLUMN)?.as_str()?.parse().ok()?;
            let fields: Fields = row
                .into_iter()
                .filter(|(column, _)| !column.starts_with(INTERNAL_COLUMN_PREFIX))
                .collect();
            let mut entity = Entity::new(entity_id);
            entity.merge_model(namespace, kind, &fields);
            Some(entity)
        })
        .collect()
}

/// Keeps the confirmed layer of the entity store in step with the indexer.
pub struct EntitySync<T: SqlTransport> {
    transport: Arc<T>,
    store: Arc<EntityStore>,
    queries: BudokanQueries,
    models: Vec<ModelKind>,
    interval: Duration,
}

impl<T: SqlTransport + 'static> EntitySync<T> {
    pub fn new(
        transport: Arc<T>,
        store: Arc<EntityStore>,
        queries: BudokanQueries,
        models: Vec<ModelKind>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            queries,
            models,
            interval,
        }
    }

    /// Pulls every configured model once; returns how many entities were merged.
    pub async fn sync_once(&self) -> Result<usize> {
        let namespace = self.queries.namespace().clone();
        let mut entities = Vec::new();
        for kind in &self.models {
            let sql = self.queries.model_rows(kind, ENTITY_SYNC_BATCH_LIMIT);
            let rows = self.transport.query(&sql).await?;
            entities.extend(rows_to_entities(&namespace, kind, rows));
        }
        let merged = entities.len();
        self.store.update_entities(entities);
        Ok(merged)
    }

    pub async fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            tracing::info!(
                "Entity sync started ({} models every {:?})",
                self.models.len(),
                self.interval
            );
            let mut failures: u32 = 0;
            loop {
                match self.sync_once().await {
                    Ok(merged) => {
                        if failures > 0 {
                            tracing::info!("Entity sync recovered after {} failures", failures);
                        }
                        failures = 0;
                        tracing::debug!("Entity sync merged {} entities", merged);
                        sleep(self.interval).await;
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let backoff = sync_backoff_secs(self.interval.as_secs(), failures);
                        tracing::warn!(
                            "Entity sync failed (attempt {}), retrying in {}s: {}",
                            failures,
                            backoff,
                            e
                        );
                        sleep(Duration::from_secs(backoff)).await;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticTransport;

    #[async_trait]
    impl SqlTransport for StaticTransport {
        async fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
            if sql.contains("-EntryCount") {
                let row = json!({
                    "internal_entity_id": "0x01",
                    "internal_updated_at": "2026-01-01",
                    "tournament_id": "0x0000000000000001",
                    "count": 3
                });
                return Ok(vec![row.as_object().cloned().expect("object")]);
            }
            Ok(Vec::new())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl SqlTransport for FailingTransport {
        async fn query(&self, _sql: &str) -> Result<Vec<SqlRow>> {
            Err(AppError::Transport("connection refused".to_string()))
        }
    }

    fn ns() -> Namespace {
        Namespace::new("budokan_1_0_7")
    }

    #[test]
    fn rows_to_entities_strips_internal_columns_and_skips_missing_ids() {
        let rows = vec![
            json!({"internal_entity_id": "0x02", "internal_id": "x", "count": 1}),
            json!({"count": 2}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().expect("object"))
        .collect();

        let entities = rows_to_entities(&ns(), &ModelKind::EntryCount, rows);
        assert_eq!(entities.len(), 1);
        let fields = entities[0]
            .model(&ns(), &ModelKind::EntryCount)
            .expect("model");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn sync_once_merges_rows_into_confirmed_layer() {
        let store = Arc::new(EntityStore::new());
        let sync = EntitySync::new(
            Arc::new(StaticTransport),
            store.clone(),
            BudokanQueries::new(ns()),
            default_synced_models(),
            Duration::from_secs(1),
        );

        let merged = sync.sync_once().await.expect("sync");
        assert_eq!(merged, 1);
        let id: EntityId = "0x01".parse().expect("id");
        let entity = store.get_confirmed_entity(&id).expect("synced");
        assert_eq!(
            entity.field(&ns(), &ModelKind::EntryCount, "count"),
            Some(&json!(3))
        );
    }

    #[tokio::test]
    async fn sync_once_propagates_transport_errors() {
        let sync = EntitySync::new(
            Arc::new(FailingTransport),
            Arc::new(EntityStore::new()),
            BudokanQueries::new(ns()),
            default_synced_models(),
            Duration::from_secs(1),
        );
        assert!(matches!(sync.sync_once().await, Err(AppError::Transport(_))));
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(sync_backoff_secs(5, 1), 5);
        assert_eq!(sync_backoff_secs(5, 2), 10);
        assert_eq!(sync_backoff_secs(5, 10), ENTITY_SYNC_BACKOFF_MAX_SECS);
    }
}

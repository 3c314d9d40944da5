use serde::{Deserialize, Serialize};
use serde_json::Value;
use starknet_core::types::Felt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::codec::{value_to_u64, value_to_u64_list};
use crate::store::{Entity, EntityDraft, EntityId, EntityStore, ModelKind, Namespace, TransactionId};

/// Declarative predicate: one field of one model equals an expected value.
///
/// Integer-like values match across encodings, so `5`, `"5"` and `"0x05"` are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPredicate {
    pub namespace: Namespace,
    pub model: ModelKind,
    pub field: String,
    pub equals: Value,
}

impl FieldPredicate {
    pub fn matches(&self, entity: &Entity) -> bool {
        let Some(actual) = entity.field(&self.namespace, &self.model, &self.field) else {
            return false;
        };
        if actual == &self.equals {
            return true;
        }
        match (value_to_u64(actual), value_to_u64(&self.equals)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// What to wait for before an optimistic mutation is confirmed.
pub struct Confirmation {
    pub entity_id: EntityId,
    pub predicate: Box<dyn Fn(&Entity) -> bool + Send + Sync>,
    pub timeout: Option<Duration>,
}

impl Confirmation {
    pub fn new<F>(entity_id: EntityId, predicate: F) -> Self
    where
        F: Fn(&Entity) -> bool + Send + Sync + 'static,
    {
        Self {
            entity_id,
            predicate: Box::new(predicate),
            timeout: None,
        }
    }

    pub fn field(entity_id: EntityId, predicate: FieldPredicate) -> Self {
        Self::new(entity_id, move |entity| predicate.matches(entity))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Optimistic mutations over the shared entity store.
///
/// Drafts become visible immediately; the caller later confirms or reverts them
/// once the on-chain outcome is known.
#[derive(Clone)]
pub struct OptimisticUpdates {
    store: Arc<EntityStore>,
    namespace: Namespace,
    default_timeout: Duration,
}

impl OptimisticUpdates {
    pub fn new(store: Arc<EntityStore>, namespace: Namespace, default_timeout: Duration) -> Self {
        Self {
            store,
            namespace,
            default_timeout,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn apply(&self, drafts: Vec<EntityDraft>) -> TransactionId {
        let id = TransactionId::new();
        self.apply_with_id(id, drafts);
        id
    }

    pub fn apply_with_id(&self, id: TransactionId, drafts: Vec<EntityDraft>) {
        self.store.apply_optimistic_update(id, drafts);
    }

    pub fn confirm(&self, id: TransactionId) -> Result<()> {
        self.store.confirm_transaction(id)
    }

    pub fn revert(&self, id: TransactionId) -> Result<()> {
        self.store.revert_optimistic_update(id)
    }

    /// Waits until the synced entity satisfies `predicate`, bounded by `timeout`
    /// or the configured default.
    pub async fn wait_for_confirmation<F>(
        &self,
        entity_id: EntityId,
        predicate: F,
        timeout: Option<Duration>,
    ) -> Result<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.store
            .wait_for_entity_change(entity_id, predicate, timeout.unwrap_or(self.default_timeout))
            .await
    }

    /// Full lifecycle: apply, run `action`, wait for confirmation, then confirm.
    /// The overlay is reverted if the action fails or confirmation never arrives.
    pub async fn execute<T, Fut>(
        &self,
        drafts: Vec<EntityDraft>,
        action: Fut,
        confirmation: Option<Confirmation>,
    ) -> Result<(TransactionId, T)>
    where
        Fut: Future<Output = Result<T>>,
    {
        let id = self.apply(drafts);

        let output = match action.await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Optimistic action {} failed, reverting: {}", id, e);
                self.revert_quietly(id);
                return Err(e);
            }
        };

        if let Some(confirmation) = confirmation {
            let predicate = &confirmation.predicate;
            if let Err(e) = self
                .wait_for_confirmation(confirmation.entity_id, |e| predicate(e), confirmation.timeout)
                .await
            {
                tracing::warn!("Optimistic update {} not confirmed, reverting: {}", id, e);
                self.revert_quietly(id);
                return Err(e);
            }
        }

        self.confirm(id)?;
        Ok((id, output))
    }

    // Internal helper that reverts without surfacing an already-finalized id.
    fn revert_quietly(&self, id: TransactionId) {
        if let Err(e) = self.revert(id) {
            tracing::debug!("Revert of {} skipped: {}", id, e);
        }
    }

    pub fn tournament_entity(tournament_id: u64) -> EntityId {
        EntityId::from_keys(&[Felt::from(tournament_id)])
    }

    /// Shows one more entry on a tournament before the enter transaction lands.
    pub fn apply_tournament_entry(&self, tournament_id: u64, current_count: u64) -> TransactionId {
        let draft = EntityDraft::new(
            Self::tournament_entity(tournament_id),
            self.namespace.clone(),
            ModelKind::EntryCount,
        )
        .with_field("tournament_id", tournament_id)
        .with_field("count", current_count.saturating_add(1));
        self.apply(vec![draft])
    }

    pub async fn wait_for_entry_count(&self, tournament_id: u64, expected: u64) -> Result<Entity> {
        let predicate = FieldPredicate {
            namespace: self.namespace.clone(),
            model: ModelKind::EntryCount,
            field: "count".to_string(),
            equals: Value::from(expected),
        };
        self.wait_for_confirmation(
            Self::tournament_entity(tournament_id),
            |entity| predicate.matches(entity),
            None,
        )
        .await
    }

    pub async fn wait_for_tournament_creation(&self, tournament_id: u64) -> Result<Entity> {
        let namespace = self.namespace.clone();
        self.wait_for_confirmation(
            Self::tournament_entity(tournament_id),
            |entity| entity.model(&namespace, &ModelKind::Tournament).is_some(),
            None,
        )
        .await
    }

    pub async fn wait_for_score_submission(&self, tournament_id: u64, token_id: u64) -> Result<Entity> {
        let namespace = self.namespace.clone();
        self.wait_for_confirmation(
            Self::tournament_entity(tournament_id),
            |entity| {
                entity
                    .field(&namespace, &ModelKind::Leaderboard, "token_ids")
                    .and_then(value_to_u64_list)
                    .is_some_and(|ids| ids.contains(&token_id))
            },
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::Fields;
    use serde_json::json;

    fn ns() -> Namespace {
        Namespace::new("budokan_1_0_7")
    }

    fn manager() -> OptimisticUpdates {
        OptimisticUpdates::new(Arc::new(EntityStore::new()), ns(), Duration::from_millis(200))
    }

    fn synced(entity_id: EntityId, kind: ModelKind, fields: Value) -> Entity {
        let mut entity = Entity::new(entity_id);
        let fields: Fields = serde_json::from_value(fields).expect("object");
        entity.merge_model(&ns(), &kind, &fields);
        entity
    }

    #[test]
    fn field_predicate_matches_across_encodings() {
        let id = OptimisticUpdates::tournament_entity(1);
        let entity = synced(id, ModelKind::EntryCount, json!({"count": "0x0000000000000005"}));
        let predicate = FieldPredicate {
            namespace: ns(),
            model: ModelKind::EntryCount,
            field: "count".to_string(),
            equals: json!(5),
        };
        assert!(predicate.matches(&entity));

        let missing = FieldPredicate {
            field: "absent".to_string(),
            ..predicate
        };
        assert!(!missing.matches(&entity));
    }

    #[test]
    fn apply_tournament_entry_bumps_count_optimistically() {
        let updates = manager();
        let tx = updates.apply_tournament_entry(3, 4);
        let entity = updates
            .store()
            .get_entity(&OptimisticUpdates::tournament_entity(3))
            .expect("entity");
        assert_eq!(
            entity.field(&ns(), &ModelKind::EntryCount, "count"),
            Some(&json!(5))
        );

        updates.revert(tx).expect("revert");
        assert!(updates
            .store()
            .get_entity(&OptimisticUpdates::tournament_entity(3))
            .is_none());
    }

    #[tokio::test]
    async fn execute_confirms_after_indexer_catches_up() {
        let updates = manager();
        let entity_id = OptimisticUpdates::tournament_entity(7);
        let draft = EntityDraft::new(entity_id, ns(), ModelKind::EntryCount).with_field("count", 1);
        let store = updates.store().clone();

        let action = async move {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.update_entity(synced(entity_id, ModelKind::EntryCount, json!({"count": 1})));
            });
            Ok::<_, AppError>("0xhash")
        };
        let confirmation = Confirmation::field(
            entity_id,
            FieldPredicate {
                namespace: ns(),
                model: ModelKind::EntryCount,
                field: "count".to_string(),
                equals: json!(1),
            },
        );

        let (tx, hash) = updates
            .execute(vec![draft], action, Some(confirmation))
            .await
            .expect("confirmed");
        assert_eq!(hash, "0xhash");
        assert!(updates.store().pending_transactions().is_empty());
        assert!(matches!(updates.revert(tx), Err(AppError::UnknownTransaction(_))));
        assert_eq!(
            updates
                .store()
                .get_entity(&entity_id)
                .and_then(|e| e.field(&ns(), &ModelKind::EntryCount, "count").cloned()),
            Some(json!(1))
        );
    }

    #[tokio::test]
    async fn execute_reverts_when_action_fails() {
        let updates = manager();
        let entity_id = OptimisticUpdates::tournament_entity(8);
        let draft = EntityDraft::new(entity_id, ns(), ModelKind::EntryCount).with_field("count", 1);

        let result = updates
            .execute::<(), _>(
                vec![draft],
                async { Err(AppError::ExternalAPI("rejected by wallet".to_string())) },
                None,
            )
            .await;

        assert!(matches!(result, Err(AppError::ExternalAPI(_))));
        assert!(updates.store().get_entity(&entity_id).is_none());
    }

    #[tokio::test]
    async fn execute_reverts_on_confirmation_timeout() {
        let updates = manager();
        let entity_id = OptimisticUpdates::tournament_entity(9);
        let draft = EntityDraft::new(entity_id, ns(), ModelKind::EntryCount).with_field("count", 1);
        let confirmation =
            Confirmation::new(entity_id, |_| true).with_timeout(Duration::from_millis(30));

        let result = updates
            .execute(vec![draft], async { Ok::<_, AppError>(()) }, Some(confirmation))
            .await;

        assert!(matches!(result, Err(AppError::ConfirmationTimeout { .. })));
        assert!(updates.store().get_entity(&entity_id).is_none());
        assert!(updates.store().pending_transactions().is_empty());
    }

    #[tokio::test]
    async fn wait_for_score_submission_reads_leaderboard_ids() {
        let updates = manager();
        let entity_id = OptimisticUpdates::tournament_entity(2);
        updates.store().update_entity(synced(
            entity_id,
            ModelKind::Leaderboard,
            json!({"tournament_id": 2, "token_ids": "[\"0x0b\", \"0x0c\"]"}),
        ));

        assert!(updates.wait_for_score_submission(2, 12).await.is_ok());
        assert!(matches!(
            updates.wait_for_score_submission(2, 13).await,
            Err(AppError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn wait_for_tournament_creation_sees_synced_model() {
        let updates = manager();
        let entity_id = OptimisticUpdates::tournament_entity(4);
        let store = updates.store().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.update_entity(synced(entity_id, ModelKind::Tournament, json!({"id": 4})));
        });

        let entity = updates.wait_for_tournament_creation(4).await.expect("created");
        assert!(entity.model(&ns(), &ModelKind::Tournament).is_some());
    }

    #[tokio::test]
    async fn wait_for_entry_count_matches_hex_count() {
        let updates = manager();
        updates.store().update_entity(synced(
            OptimisticUpdates::tournament_entity(5),
            ModelKind::EntryCount,
            json!({"count": "0x0000000000000003"}),
        ));
        assert!(updates.wait_for_entry_count(5, 3).await.is_ok());
    }
}

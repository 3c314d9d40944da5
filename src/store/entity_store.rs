use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::entity::{Entity, EntityDraft, EntityId, Fields, ModelKind, Namespace};
use super::transaction::{TransactionId, TransactionStatus};
use crate::error::{AppError, Result};

/// Published on every store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreVersion {
    pub version: u64,
    pub closed: bool,
}

type FieldKey = (EntityId, Namespace, ModelKind, String);

#[derive(Debug)]
struct OverlayDraft {
    draft: EntityDraft,
    // Store version current when the draft was applied.
    applied_at: u64,
}

#[derive(Debug)]
struct Overlay {
    id: TransactionId,
    drafts: Vec<OverlayDraft>,
    status: TransactionStatus,
    touched_at: Instant,
}

#[derive(Debug, Default)]
struct StoreInner {
    confirmed: BTreeMap<EntityId, Entity>,
    // Replayed over `confirmed` in apply order.
    overlays: Vec<Overlay>,
    // Version of the last indexer write per field, kept only while overlays exist.
    indexer_writes: BTreeMap<FieldKey, u64>,
    replaced_at: u64,
    version: u64,
    closed: bool,
}

impl StoreInner {
    fn indexer_wrote_since(&self, entry: &OverlayDraft, field: &str) -> bool {
        if self.replaced_at > entry.applied_at {
            return true;
        }
        let draft = &entry.draft;
        let key = (
            draft.entity_id,
            draft.namespace.clone(),
            draft.model.clone(),
            field.to_string(),
        );
        self.indexer_writes
            .get(&key)
            .is_some_and(|written| *written > entry.applied_at)
    }

    // Internal helper that picks the fields of `entry` to replay. Pending overlays
    // win outright; confirmed ones yield to indexer writes made after the apply.
    fn replay_fields(&self, status: TransactionStatus, entry: &OverlayDraft) -> Fields {
        if status == TransactionStatus::Applied {
            return entry.draft.fields.clone();
        }
        entry
            .draft
            .fields
            .iter()
            .filter(|(name, _)| !self.indexer_wrote_since(entry, name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn replay(
        &self,
        overlay: &Overlay,
        entities: &mut BTreeMap<EntityId, Entity>,
        only: Option<&EntityId>,
    ) {
        for entry in &overlay.drafts {
            let draft = &entry.draft;
            if only.is_some_and(|entity_id| entity_id != &draft.entity_id) {
                continue;
            }
            let fields = self.replay_fields(overlay.status, entry);
            if fields.is_empty() && !draft.fields.is_empty() {
                continue;
            }
            entities
                .entry(draft.entity_id)
                .or_insert_with(|| Entity::new(draft.entity_id))
                .merge_model(&draft.namespace, &draft.model, &fields);
        }
    }

    // Internal helper that folds confirmed overlays at the front of the queue into the base layer.
    fn compact(&mut self) {
        let ready = self
            .overlays
            .iter()
            .take_while(|overlay| overlay.status == TransactionStatus::Confirmed)
            .count();
        let folded: Vec<Overlay> = self.overlays.drain(..ready).collect();
        let mut confirmed = std::mem::take(&mut self.confirmed);
        for overlay in &folded {
            self.replay(overlay, &mut confirmed, None);
        }
        self.confirmed = confirmed;
        if self.overlays.is_empty() {
            self.indexer_writes.clear();
        }
    }

    fn record_indexer_write(&mut self, entity: &Entity, stamp: u64) {
        if self.overlays.is_empty() {
            return;
        }
        for (namespace, models) in &entity.models {
            for (kind, fields) in models {
                for name in fields.keys() {
                    self.indexer_writes.insert(
                        (entity.entity_id, namespace.clone(), kind.clone(), name.clone()),
                        stamp,
                    );
                }
            }
        }
    }

    fn view(&self, entity_id: &EntityId) -> Option<Entity> {
        let mut entities = BTreeMap::new();
        if let Some(entity) = self.confirmed.get(entity_id) {
            entities.insert(*entity_id, entity.clone());
        }
        for overlay in &self.overlays {
            self.replay(overlay, &mut entities, Some(entity_id));
        }
        entities.remove(entity_id)
    }

    fn view_all(&self) -> BTreeMap<EntityId, Entity> {
        let mut entities = self.confirmed.clone();
        for overlay in &self.overlays {
            self.replay(overlay, &mut entities, None);
        }
        entities
    }
}

/// Local mirror of indexer entities with an optimistic overlay layer.
///
/// Reads through [`EntityStore::get_entity`] see confirmed state with every live
/// overlay replayed on top in apply order. Confirmation waits observe only the
/// confirmed layer, which is written by the indexer sync.
#[derive(Debug)]
pub struct EntityStore {
    inner: RwLock<StoreInner>,
    changes: watch::Sender<StoreVersion>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(StoreVersion::default());
        Self {
            inner: RwLock::new(StoreInner::default()),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Internal helper that publishes a new version while the write lock is held.
    fn publish(&self, inner: &mut StoreInner) {
        inner.version += 1;
        self.changes.send_replace(StoreVersion {
            version: inner.version,
            closed: inner.closed,
        });
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> watch::Receiver<StoreVersion> {
        self.changes.subscribe()
    }

    pub fn version(&self) -> StoreVersion {
        *self.changes.borrow()
    }

    /// Entity as currently visible, optimistic overlays included.
    pub fn get_entity(&self, entity_id: &EntityId) -> Option<Entity> {
        self.read().view(entity_id)
    }

    /// Every visible entity, optimistic overlays included.
    pub fn get_entities(&self) -> Vec<Entity> {
        self.read().view_all().into_values().collect()
    }

    /// Entity as last synced from the indexer, ignoring pending overlays.
    pub fn get_confirmed_entity(&self, entity_id: &EntityId) -> Option<Entity> {
        self.read().confirmed.get(entity_id).cloned()
    }

    /// Merges confirmed indexer state into the base layer.
    pub fn update_entity(&self, entity: Entity) {
        self.update_entities(vec![entity]);
    }

    pub fn update_entities(&self, entities: Vec<Entity>) {
        if entities.is_empty() {
            return;
        }
        let mut inner = self.write();
        let stamp = inner.version + 1;
        for entity in entities {
            inner.record_indexer_write(&entity, stamp);
            inner
                .confirmed
                .entry(entity.entity_id)
                .or_insert_with(|| Entity::new(entity.entity_id))
                .merge_entity(&entity);
        }
        self.publish(&mut inner);
    }

    /// Replaces the whole confirmed layer.
    pub fn set_entities(&self, entities: Vec<Entity>) {
        let mut inner = self.write();
        inner.replaced_at = inner.version + 1;
        inner.indexer_writes.clear();
        inner.confirmed = entities
            .into_iter()
            .map(|entity| (entity.entity_id, entity))
            .collect();
        self.publish(&mut inner);
    }

    /// Applies drafts as one optimistic overlay. A live overlay with the same id is extended.
    pub fn apply_optimistic_update(&self, id: TransactionId, drafts: Vec<EntityDraft>) {
        let mut inner = self.write();
        let draft_count = drafts.len();
        let applied_at = inner.version;
        let drafts = drafts
            .into_iter()
            .map(|draft| OverlayDraft { draft, applied_at });
        let live = inner
            .overlays
            .iter()
            .position(|overlay| overlay.id == id && overlay.status == TransactionStatus::Applied);
        match live {
            Some(index) => {
                let overlay = &mut inner.overlays[index];
                overlay.drafts.extend(drafts);
                overlay.touched_at = Instant::now();
            }
            None => inner.overlays.push(Overlay {
                id,
                drafts: drafts.collect(),
                status: TransactionStatus::Applied,
                touched_at: Instant::now(),
            }),
        }
        tracing::debug!("Applied optimistic update {} ({} drafts)", id, draft_count);
        self.publish(&mut inner);
    }

    /// Drops one pending overlay. Other overlays stay in place.
    pub fn revert_optimistic_update(&self, id: TransactionId) -> Result<()> {
        let mut inner = self.write();
        let position = inner
            .overlays
            .iter()
            .position(|overlay| overlay.id == id && overlay.status == TransactionStatus::Applied)
            .ok_or_else(|| AppError::UnknownTransaction(id.to_string()))?;
        inner.overlays.remove(position);
        inner.compact();
        tracing::debug!("Reverted optimistic update {}", id);
        self.publish(&mut inner);
        Ok(())
    }

    /// Marks a pending overlay as confirmed; its data stays visible.
    pub fn confirm_transaction(&self, id: TransactionId) -> Result<()> {
        let mut inner = self.write();
        let overlay = inner
            .overlays
            .iter_mut()
            .find(|overlay| overlay.id == id && overlay.status == TransactionStatus::Applied)
            .ok_or_else(|| AppError::UnknownTransaction(id.to_string()))?;
        overlay.status = TransactionStatus::Confirmed;
        inner.compact();
        tracing::debug!("Confirmed optimistic update {}", id);
        self.publish(&mut inner);
        Ok(())
    }

    pub fn pending_transactions(&self) -> Vec<TransactionId> {
        self.read()
            .overlays
            .iter()
            .filter(|overlay| overlay.status == TransactionStatus::Applied)
            .map(|overlay| overlay.id)
            .collect()
    }

    /// Reverts pending overlays neither confirmed, reverted nor extended within `max_age`.
    pub fn expire_pending(&self, max_age: Duration) -> Vec<TransactionId> {
        let mut inner = self.write();
        let now = Instant::now();
        let mut expired = Vec::new();
        inner.overlays.retain(|overlay| {
            let stale = overlay.status == TransactionStatus::Applied
                && now.duration_since(overlay.touched_at) > max_age;
            if stale {
                expired.push(overlay.id);
            }
            !stale
        });
        if expired.is_empty() {
            return expired;
        }
        inner.compact();
        for id in &expired {
            tracing::warn!(
                "Expired optimistic update {} after {:?} without confirm or revert",
                id,
                max_age
            );
        }
        self.publish(&mut inner);
        expired
    }

    /// Resolves once the confirmed entity satisfies `predicate`.
    ///
    /// The predicate is checked against the current state first, then after every
    /// change notification. Fails with `ConfirmationTimeout` after `timeout` and with
    /// `StoreClosed` if the store shuts down first.
    pub async fn wait_for_entity_change<F>(
        &self,
        entity_id: EntityId,
        predicate: F,
        timeout: Duration,
    ) -> Result<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        let mut changes = self.changes.subscribe();
        let wait = async {
            loop {
                let seen = *changes.borrow_and_update();
                if let Some(entity) = self.get_confirmed_entity(&entity_id) {
                    if predicate(&entity) {
                        return Ok(entity);
                    }
                }
                if seen.closed {
                    return Err(AppError::StoreClosed);
                }
                if changes.changed().await.is_err() {
                    return Err(AppError::StoreClosed);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| AppError::ConfirmationTimeout {
                entity_id: entity_id.to_string(),
                waited_ms: timeout.as_millis() as u64,
            })?
    }

    /// Wakes every waiter with `StoreClosed`. Reads keep working.
    pub fn shutdown(&self) {
        let mut inner = self.write();
        if inner.closed {
            return;
        }
        inner.closed = true;
        tracing::info!("Entity store shut down");
        self.publish(&mut inner);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use starknet_core::types::Felt;
use starknet_crypto::poseidon_hash_many;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::utils::{felt_to_padded_hex, parse_felt};

/// Field values of one model instance, keyed by column name.
pub type Fields = Map<String, Value>;

/// Identifier of a synced entity: the Poseidon hash of its model keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Felt);

impl EntityId {
    pub fn new(value: Felt) -> Self {
        Self(value)
    }

    /// Derives the entity id from model key values the same way the world contract does.
    pub fn from_keys(keys: &[Felt]) -> Self {
        Self(poseidon_hash_many(keys))
    }

    pub fn felt(&self) -> Felt {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&felt_to_padded_hex(&self.0))
    }
}

impl FromStr for EntityId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        parse_felt(s).map(Self)
    }
}

impl Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// World namespace a model is registered under (e.g. `budokan_1_0_7`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Models registered by the Budokan world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    Tournament,
    Registration,
    Leaderboard,
    Prize,
    PrizeClaim,
    EntryCount,
    PlatformMetrics,
    PrizeMetrics,
    TournamentTokenMetrics,
    QualificationEntries,
    Token,
    Custom(String),
}

impl ModelKind {
    pub fn as_str(&self) -> &str {
        match self {
            ModelKind::Tournament => "Tournament",
            ModelKind::Registration => "Registration",
            ModelKind::Leaderboard => "Leaderboard",
            ModelKind::Prize => "Prize",
            ModelKind::PrizeClaim => "PrizeClaim",
            ModelKind::EntryCount => "EntryCount",
            ModelKind::PlatformMetrics => "PlatformMetrics",
            ModelKind::PrizeMetrics => "PrizeMetrics",
            ModelKind::TournamentTokenMetrics => "TournamentTokenMetrics",
            ModelKind::QualificationEntries => "QualificationEntries",
            ModelKind::Token => "Token",
            ModelKind::Custom(name) => name,
        }
    }

    /// Indexer table holding this model, e.g. `budokan_1_0_7-Tournament`.
    pub fn table_name(&self, namespace: &Namespace) -> String {
        format!("{}-{}", namespace, self.as_str())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ModelKind {
    fn from(name: &str) -> Self {
        match name {
            "Tournament" => ModelKind::Tournament,
            "Registration" => ModelKind::Registration,
            "Leaderboard" => ModelKind::Leaderboard,
            "Prize" => ModelKind::Prize,
            "PrizeClaim" => ModelKind::PrizeClaim,
            "EntryCount" => ModelKind::EntryCount,
            "PlatformMetrics" => ModelKind::PlatformMetrics,
            "PrizeMetrics" => ModelKind::PrizeMetrics,
            "TournamentTokenMetrics" => ModelKind::TournamentTokenMetrics,
            "QualificationEntries" => ModelKind::QualificationEntries,
            "Token" => ModelKind::Token,
            other => ModelKind::Custom(other.to_string()),
        }
    }
}

impl Serialize for ModelKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModelKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ModelKind::from(raw.as_str()))
    }
}

/// A synced record: one or more models grouped by namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub models: BTreeMap<Namespace, BTreeMap<ModelKind, Fields>>,
}

impl Entity {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            models: BTreeMap::new(),
        }
    }

    pub fn model(&self, namespace: &Namespace, kind: &ModelKind) -> Option<&Fields> {
        self.models.get(namespace).and_then(|models| models.get(kind))
    }

    pub fn field(&self, namespace: &Namespace, kind: &ModelKind, field: &str) -> Option<&Value> {
        self.model(namespace, kind).and_then(|fields| fields.get(field))
    }

    /// Three-way merge of one model's fields:
    /// absent model is created, present model is shallow-merged with supplied fields winning.
    pub fn merge_model(&mut self, namespace: &Namespace, kind: &ModelKind, fields: &Fields) {
        let model = self
            .models
            .entry(namespace.clone())
            .or_default()
            .entry(kind.clone())
            .or_default();
        for (name, value) in fields {
            model.insert(name.clone(), value.clone());
        }
    }

    /// Merges every model of `other` into this entity.
    pub fn merge_entity(&mut self, other: &Entity) {
        for (namespace, models) in &other.models {
            for (kind, fields) in models {
                self.merge_model(namespace, kind, fields);
            }
        }
    }
}

/// One unit of an optimistic mutation against a single model of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub entity_id: EntityId,
    pub namespace: Namespace,
    pub model: ModelKind,
    pub fields: Fields,
}

impl EntityDraft {
    pub fn new(entity_id: EntityId, namespace: Namespace, model: ModelKind) -> Self {
        Self {
            entity_id,
            namespace,
            model,
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ns() -> Namespace {
        Namespace::new("budokan_1_0_7")
    }

    #[test]
    fn entity_id_from_keys_matches_poseidon() {
        let keys = [Felt::from(7_u64)];
        let id = EntityId::from_keys(&keys);
        assert_eq!(id.felt(), poseidon_hash_many(&keys));
        assert_eq!(id.to_string().len(), 66);
    }

    #[test]
    fn entity_id_round_trips_through_string() {
        let id = EntityId::new(Felt::from(255_u64));
        let parsed: EntityId = id.to_string().parse().expect("parse id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn model_kind_parses_known_and_custom_names() {
        assert_eq!(ModelKind::from("EntryCount"), ModelKind::EntryCount);
        assert_eq!(
            ModelKind::from("GameSettings"),
            ModelKind::Custom("GameSettings".to_string())
        );
        assert_eq!(ModelKind::Prize.table_name(&ns()), "budokan_1_0_7-Prize");
    }

    #[test]
    fn merge_model_creates_missing_model_with_exact_fields() {
        let id = EntityId::new(Felt::from(1_u64));
        let mut entity = Entity::new(id);
        let draft = EntityDraft::new(id, ns(), ModelKind::EntryCount).with_field("count", 5);

        entity.merge_model(&draft.namespace, &draft.model, &draft.fields);

        let model = entity.model(&ns(), &ModelKind::EntryCount).expect("model");
        assert_eq!(model.len(), 1);
        assert_eq!(model.get("count"), Some(&json!(5)));
    }

    #[test]
    fn merge_model_adds_sibling_without_touching_existing() {
        let id = EntityId::new(Felt::from(2_u64));
        let mut entity = Entity::new(id);
        let mut tournament = Fields::new();
        tournament.insert("name".to_string(), json!("Weekly"));
        entity.merge_model(&ns(), &ModelKind::Tournament, &tournament);

        let mut count = Fields::new();
        count.insert("count".to_string(), json!(1));
        entity.merge_model(&ns(), &ModelKind::EntryCount, &count);

        assert_eq!(
            entity.field(&ns(), &ModelKind::Tournament, "name"),
            Some(&json!("Weekly"))
        );
        assert_eq!(
            entity.field(&ns(), &ModelKind::EntryCount, "count"),
            Some(&json!(1))
        );
    }

    #[test]
    fn merge_model_overwrites_supplied_and_keeps_untouched_fields() {
        let id = EntityId::new(Felt::from(3_u64));
        let mut entity = Entity::new(id);
        let mut first = Fields::new();
        first.insert("count".to_string(), json!(1));
        first.insert("tournament_id".to_string(), json!(9));
        entity.merge_model(&ns(), &ModelKind::EntryCount, &first);

        let mut second = Fields::new();
        second.insert("count".to_string(), json!(2));
        entity.merge_model(&ns(), &ModelKind::EntryCount, &second);

        assert_eq!(
            entity.field(&ns(), &ModelKind::EntryCount, "count"),
            Some(&json!(2))
        );
        assert_eq!(
            entity.field(&ns(), &ModelKind::EntryCount, "tournament_id"),
            Some(&json!(9))
        );
    }
}

pub mod entity;
pub mod entity_store;
pub mod transaction;

pub use entity::{Entity, EntityDraft, EntityId, Fields, ModelKind, Namespace};
pub use entity_store::{EntityStore, StoreVersion};
pub use transaction::{TransactionId, TransactionStatus};

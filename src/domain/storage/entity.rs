//! Entity traits and identifier types

use std::fmt::{self, Debug};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Document key holding the entity identifier
pub const ID_FIELD: &str = "id";
/// Document key holding the creation timestamp
pub const CREATED_AT_FIELD: &str = "created_at";
/// Document key holding the last-modified timestamp
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Keys the persistence layer owns; payloads may never carry them
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Opaque entity identifier, generated by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh UUID v4 identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A closed set of names an entity exposes to queries (fields or relations)
pub trait FieldName: Copy + Debug + Eq + Hash + Send + Sync + 'static {
    /// Returns the serialized document key
    fn name(&self) -> &'static str;

    /// Every member of the set
    fn all() -> &'static [Self];
}

/// Relation set for entities without relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoRelations {}

impl FieldName for NoRelations {
    fn name(&self) -> &'static str {
        match *self {}
    }

    fn all() -> &'static [Self] {
        &[]
    }
}

/// A uniquely identified, timestamped record managed by a repository
///
/// `Draft` and `Patch` are the create and update payloads. Neither may
/// contain the id or the timestamps: the persistence layer generates those.
/// `Patch` fields that are `None` must be skipped during serialization so
/// they leave the stored value untouched.
pub trait Entity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Model identifier, also used as the default table name
    const MODEL: &'static str;

    /// Fields usable in criteria and ordering
    type Field: FieldName;

    /// Relations that callers may include
    type Relation: FieldName;

    /// Create payload
    type Draft: Serialize + Debug + Clone + Send + Sync + 'static;

    /// Partial update payload
    type Patch: Serialize + Debug + Clone + Default + Send + Sync + 'static;

    fn id(&self) -> &EntityId;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    /// Fields whose non-null values must be unique across the model
    fn unique_fields() -> &'static [Self::Field] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::fixtures::{Stock, StockField};

    #[test]
    fn test_entity_id_generate_is_uuid() {
        let id = EntityId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, EntityId::generate());
    }

    #[test]
    fn test_entity_id_serializes_transparently() {
        let id = EntityId::new("stock-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"stock-1\"");
        assert_eq!(id.to_string(), "stock-1");
    }

    #[test]
    fn test_unique_fields_declared() {
        assert_eq!(Stock::unique_fields(), &[StockField::Puuid]);
        assert_eq!(Stock::MODEL, "stock");
    }

    #[test]
    fn test_reserved_fields() {
        assert!(RESERVED_FIELDS.contains(&"id"));
        assert!(RESERVED_FIELDS.contains(&"created_at"));
        assert!(RESERVED_FIELDS.contains(&"updated_at"));
    }
}

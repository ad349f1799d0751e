//! Filter criteria, ordering, pagination and relation includes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{
    Entity, EntityId, FieldName, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};

/// Value a field is compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl FieldValue {
    /// Converts to the JSON representation stored in entity documents
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            // Same RFC 3339 rendering serde uses for entity timestamps
            Self::Timestamp(ts) => serde_json::to_value(ts).unwrap_or(Value::Null),
            Self::Null => Value::Null,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Integer(n as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Integer(n as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<&EntityId> for FieldValue {
    fn from(id: &EntityId) -> Self {
        Self::String(id.as_str().to_string())
    }
}

impl From<EntityId> for FieldValue {
    fn from(id: EntityId) -> Self {
        Self::from(&id)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// A queryable key: one of the persistence-owned attributes or a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey<F> {
    Id,
    CreatedAt,
    UpdatedAt,
    Field(F),
}

impl<F: FieldName> FieldKey<F> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => ID_FIELD,
            Self::CreatedAt => CREATED_AT_FIELD,
            Self::UpdatedAt => UPDATED_AT_FIELD,
            Self::Field(field) => field.name(),
        }
    }
}

impl<F: FieldName> From<F> for FieldKey<F> {
    fn from(field: F) -> Self {
        Self::Field(field)
    }
}

/// Partial field-to-value equality constraints; empty criteria match everything
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria<F> {
    conditions: Vec<(FieldKey<F>, FieldValue)>,
}

impl<F> Default for Criteria<F> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }
}

impl<F: FieldName> Criteria<F> {
    /// Criteria matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Criteria selecting a single record by identifier
    pub fn by_id(id: &EntityId) -> Self {
        Self::all().eq(FieldKey::Id, id)
    }

    /// Adds an equality constraint; a repeated key replaces the earlier value
    pub fn eq(mut self, key: impl Into<FieldKey<F>>, value: impl Into<FieldValue>) -> Self {
        let key = key.into();
        let value = value.into();

        match self.conditions.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.conditions.push((key, value)),
        }

        self
    }

    pub fn get(&self, key: impl Into<FieldKey<F>>) -> Option<&FieldValue> {
        let key = key.into();
        self.conditions
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FieldKey<F>, FieldValue)> {
        self.conditions.iter()
    }

    /// Renders the criteria as a JSON object keyed by document field names
    pub fn to_document(&self) -> Map<String, Value> {
        self.conditions
            .iter()
            .map(|(key, value)| (key.name().to_string(), value.to_json()))
            .collect()
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ordering term; terms apply in the order given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub key: FieldKey<F>,
    pub order: SortOrder,
}

impl<F: FieldName> OrderBy<F> {
    pub fn asc(key: impl Into<FieldKey<F>>) -> Self {
        Self {
            key: key.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(key: impl Into<FieldKey<F>>) -> Self {
        Self {
            key: key.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Relations to eagerly attach to results
#[derive(Debug, Clone, PartialEq)]
pub struct Include<R> {
    relations: Vec<R>,
}

impl<R> Default for Include<R> {
    fn default() -> Self {
        Self {
            relations: Vec::new(),
        }
    }
}

impl<R: FieldName> Include<R> {
    /// Attach no relations
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(relations: impl IntoIterator<Item = R>) -> Self {
        relations
            .into_iter()
            .fold(Self::none(), |include, relation| include.with(relation))
    }

    pub fn with(mut self, relation: R) -> Self {
        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
        self
    }

    pub fn contains(&self, relation: &R) -> bool {
        self.relations.contains(relation)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.relations.iter().any(|r| r.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.relations.iter()
    }
}

/// Options for multi-record reads; the default is unrestricted
#[derive(Debug, Clone)]
pub struct FindManyOptions<E: Entity> {
    pub filter: Criteria<E::Field>,
    pub order_by: Vec<OrderBy<E::Field>>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub include: Include<E::Relation>,
}

impl<E: Entity> Default for FindManyOptions<E> {
    fn default() -> Self {
        Self {
            filter: Criteria::all(),
            order_by: Vec::new(),
            skip: None,
            take: None,
            include: Include::none(),
        }
    }
}

impl<E: Entity> FindManyOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Criteria<E::Field>) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order: OrderBy<E::Field>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn include(mut self, include: Include<E::Relation>) -> Self {
        self.include = include;
        self
    }
}

/// Options for single-record lookups; criteria are mandatory
#[derive(Debug, Clone)]
pub struct FindOneOptions<E: Entity> {
    pub filter: Criteria<E::Field>,
    pub include: Include<E::Relation>,
}

impl<E: Entity> FindOneOptions<E> {
    pub fn new(filter: Criteria<E::Field>) -> Self {
        Self {
            filter,
            include: Include::none(),
        }
    }

    pub fn include(mut self, include: Include<E::Relation>) -> Self {
        self.include = include;
        self
    }
}

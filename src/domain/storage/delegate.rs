//! Persistence delegate contract
//!
//! A delegate is bound to one model and knows how to run the ten CRUD
//! operations against a concrete backend. Repositories forward to it
//! without interpreting the arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::domain::DomainError;

use super::entity::{Entity, EntityId};
use super::query::{Criteria, FindManyOptions, Include};

/// Number of records touched by a bulk mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchCount {
    pub count: u64,
}

impl BatchCount {
    pub fn new(count: u64) -> Self {
        Self { count }
    }
}

#[derive(Debug, Clone)]
pub struct CreateArgs<E: Entity> {
    pub data: E::Draft,
}

impl<E: Entity> CreateArgs<E> {
    pub fn new(data: E::Draft) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone)]
pub struct FindUniqueArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
    pub include: Include<E::Relation>,
}

impl<E: Entity> FindUniqueArgs<E> {
    pub fn new(filter: Criteria<E::Field>, include: Include<E::Relation>) -> Self {
        Self { filter, include }
    }

    pub fn by_id(id: &EntityId, include: Include<E::Relation>) -> Self {
        Self::new(Criteria::by_id(id), include)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
    pub data: E::Patch,
}

impl<E: Entity> UpdateArgs<E> {
    pub fn by_id(id: &EntityId, data: E::Patch) -> Self {
        Self {
            filter: Criteria::by_id(id),
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateManyArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
    pub data: E::Patch,
}

impl<E: Entity> UpdateManyArgs<E> {
    pub fn new(filter: Criteria<E::Field>, data: E::Patch) -> Self {
        Self { filter, data }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
}

impl<E: Entity> DeleteArgs<E> {
    pub fn by_id(id: &EntityId) -> Self {
        Self {
            filter: Criteria::by_id(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteManyArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
}

impl<E: Entity> DeleteManyArgs<E> {
    pub fn new(filter: Criteria<E::Field>) -> Self {
        Self { filter }
    }
}

#[derive(Debug, Clone)]
pub struct CountArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
}

impl<E: Entity> CountArgs<E> {
    pub fn new(filter: Criteria<E::Field>) -> Self {
        Self { filter }
    }
}

#[derive(Debug, Clone)]
pub struct UpsertArgs<E: Entity> {
    pub filter: Criteria<E::Field>,
    pub create: E::Draft,
    pub update: E::Patch,
}

impl<E: Entity> UpsertArgs<E> {
    pub fn new(filter: Criteria<E::Field>, create: E::Draft, update: E::Patch) -> Self {
        Self {
            filter,
            create,
            update,
        }
    }
}

/// Storage capability for one model
///
/// Single-record operations (`find_unique`, `update`, `delete`, `upsert`)
/// target the first match in the backend's storage order when the criteria
/// select several records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelDelegate<E: Entity>: Send + Sync {
    /// Inserts a record, generating its id and timestamps
    async fn create(&self, args: CreateArgs<E>) -> Result<E, DomainError>;

    async fn find_many(&self, args: FindManyOptions<E>) -> Result<Vec<E>, DomainError>;

    async fn find_unique(&self, args: FindUniqueArgs<E>) -> Result<Option<E>, DomainError>;

    async fn find_first(&self, args: FindManyOptions<E>) -> Result<Option<E>, DomainError>;

    /// Fails with `NotFound` when nothing matches
    async fn update(&self, args: UpdateArgs<E>) -> Result<E, DomainError>;

    async fn update_many(&self, args: UpdateManyArgs<E>) -> Result<BatchCount, DomainError>;

    /// Returns the removed record; fails with `NotFound` when nothing matches
    async fn delete(&self, args: DeleteArgs<E>) -> Result<E, DomainError>;

    async fn delete_many(&self, args: DeleteManyArgs<E>) -> Result<BatchCount, DomainError>;

    async fn count(&self, args: CountArgs<E>) -> Result<u64, DomainError>;

    /// Updates the first match, or creates a record when nothing matches
    async fn upsert(&self, args: UpsertArgs<E>) -> Result<E, DomainError>;
}

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::storage::{
    BatchCount, CountArgs, CreateArgs, Criteria, DeleteArgs, DeleteManyArgs, Entity, EntityId,
    FindManyOptions, FindOneOptions, FindUniqueArgs, Include, ModelDelegate, UpdateArgs,
    UpdateManyArgs, UpsertArgs,
};
use crate::domain::DomainError;

/// Generic CRUD surface over one model
///
/// Every operation forwards to the model's delegate unchanged: no retries,
/// no validation, no result shaping. Errors come back exactly as the
/// delegate raised them. Implementors only provide `delegate()` and are
/// free to add model-specific queries on top:
///
/// ```rust,ignore
/// struct StockRepository {
///     delegate: Arc<dyn ModelDelegate<Stock>>,
/// }
///
/// impl CrudRepository<Stock> for StockRepository {
///     fn delegate(&self) -> &dyn ModelDelegate<Stock> {
///         self.delegate.as_ref()
///     }
/// }
///
/// impl StockRepository {
///     async fn find_by_puuid(&self, puuid: &str) -> Result<Option<Stock>, DomainError> {
///         self.find_one(FindOneOptions::new(Criteria::all().eq(StockField::Puuid, puuid)))
///             .await
///     }
/// }
/// ```
#[async_trait]
pub trait CrudRepository<E: Entity>: Send + Sync {
    fn delegate(&self) -> &dyn ModelDelegate<E>;

    /// Model identifier used in log events
    fn model(&self) -> &str {
        E::MODEL
    }

    async fn create(&self, data: E::Draft) -> Result<E, DomainError> {
        debug!(model = %self.model(), "Creating record");
        self.delegate().create(CreateArgs::new(data)).await
    }

    /// Pass `FindManyOptions::default()` for an unrestricted listing
    async fn find_all(&self, options: FindManyOptions<E>) -> Result<Vec<E>, DomainError> {
        debug!(model = %self.model(), "Finding records");
        self.delegate().find_many(options).await
    }

    async fn find_by_id(
        &self,
        id: &EntityId,
        include: Include<E::Relation>,
    ) -> Result<Option<E>, DomainError> {
        debug!(model = %self.model(), id = %id, "Finding record by id");
        self.delegate()
            .find_unique(FindUniqueArgs::by_id(id, include))
            .await
    }

    async fn find_one(&self, options: FindOneOptions<E>) -> Result<Option<E>, DomainError> {
        debug!(model = %self.model(), "Finding one record");
        self.delegate()
            .find_unique(FindUniqueArgs::new(options.filter, options.include))
            .await
    }

    async fn find_first(&self, options: FindManyOptions<E>) -> Result<Option<E>, DomainError> {
        debug!(model = %self.model(), "Finding first record");
        self.delegate().find_first(options).await
    }

    async fn update(&self, id: &EntityId, data: E::Patch) -> Result<E, DomainError> {
        debug!(model = %self.model(), id = %id, "Updating record");
        self.delegate().update(UpdateArgs::by_id(id, data)).await
    }

    async fn update_many(
        &self,
        filter: Criteria<E::Field>,
        data: E::Patch,
    ) -> Result<BatchCount, DomainError> {
        debug!(model = %self.model(), "Updating records");
        self.delegate()
            .update_many(UpdateManyArgs::new(filter, data))
            .await
    }

    async fn delete(&self, id: &EntityId) -> Result<E, DomainError> {
        debug!(model = %self.model(), id = %id, "Deleting record");
        self.delegate().delete(DeleteArgs::by_id(id)).await
    }

    async fn delete_many(&self, filter: Criteria<E::Field>) -> Result<BatchCount, DomainError> {
        debug!(model = %self.model(), "Deleting records");
        self.delegate().delete_many(DeleteManyArgs::new(filter)).await
    }

    /// Pass `Criteria::all()` to count every record
    async fn count(&self, filter: Criteria<E::Field>) -> Result<u64, DomainError> {
        self.delegate().count(CountArgs::new(filter)).await
    }

    async fn exists(&self, filter: Criteria<E::Field>) -> Result<bool, DomainError> {
        Ok(self.count(filter).await? > 0)
    }

    async fn upsert(
        &self,
        filter: Criteria<E::Field>,
        create: E::Draft,
        update: E::Patch,
    ) -> Result<E, DomainError> {
        debug!(model = %self.model(), "Upserting record");
        self.delegate()
            .upsert(UpsertArgs::new(filter, create, update))
            .await
    }
}

/// Ready-made repository holding a delegate and the model identifier
pub struct BaseRepository<E: Entity> {
    delegate: Arc<dyn ModelDelegate<E>>,
    model: String,
}

impl<E: Entity> BaseRepository<E> {
    pub fn new(delegate: Arc<dyn ModelDelegate<E>>, model: impl Into<String>) -> Self {
        Self {
            delegate,
            model: model.into(),
        }
    }

    /// Binds the delegate under the entity's own model identifier
    pub fn from_delegate(delegate: Arc<dyn ModelDelegate<E>>) -> Self {
        Self::new(delegate, E::MODEL)
    }
}

impl<E: Entity> Clone for BaseRepository<E> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
            model: self.model.clone(),
        }
    }
}

impl<E: Entity> Debug for BaseRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRepository")
            .field("model", &self.model)
            .finish()
    }
}

impl<E: Entity> CrudRepository<E> for BaseRepository<E> {
    fn delegate(&self) -> &dyn ModelDelegate<E> {
        self.delegate.as_ref()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

//! Domain layer - Entities, persistence contract and repositories

pub mod error;
pub mod storage;
pub mod traits;

pub use error::DomainError;
pub use storage::{
    BatchCount, Criteria, Entity, EntityId, FieldKey, FieldName, FieldValue, FindManyOptions,
    FindOneOptions, Include, ModelDelegate, NoRelations, OrderBy, SortOrder,
};
pub use traits::{BaseRepository, CrudRepository};

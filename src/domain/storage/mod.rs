//! Storage domain - entity contract, query options and the persistence delegate

mod delegate;
mod entity;
mod query;

pub use delegate::{
    BatchCount, CountArgs, CreateArgs, DeleteArgs, DeleteManyArgs, FindUniqueArgs, ModelDelegate,
    UpdateArgs, UpdateManyArgs, UpsertArgs,
};
pub use entity::{
    Entity, EntityId, FieldName, NoRelations, CREATED_AT_FIELD, ID_FIELD, RESERVED_FIELDS,
    UPDATED_AT_FIELD,
};
pub use query::{
    Criteria, FieldKey, FieldValue, FindManyOptions, FindOneOptions, Include, OrderBy, SortOrder,
};

#[cfg(test)]
pub use delegate::MockModelDelegate;

#[cfg(test)]
pub mod fixtures;

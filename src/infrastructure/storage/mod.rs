//! Storage infrastructure - Model delegate implementations

mod document;
mod factory;
mod in_memory;
mod postgres;

pub use factory::{DelegateFactory, StorageConfig, StorageType};
pub use in_memory::InMemoryDelegate;
pub use postgres::{connect_pool, map_sqlx_error, PostgresConfig, PostgresDelegate};

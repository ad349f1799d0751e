//! Entity Repository
//!
//! A generic, model-agnostic repository layer. Each repository is bound to
//! one entity model and forwards every CRUD operation to a model delegate,
//! which owns the actual persistence:
//! - In-memory delegate for tests and development
//! - PostgreSQL delegate storing JSONB documents
//! - Layered configuration and structured logging

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    BaseRepository, BatchCount, CrudRepository, DomainError, Entity, EntityId, ModelDelegate,
};
pub use infrastructure::storage::{DelegateFactory, StorageConfig, StorageType};

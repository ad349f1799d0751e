//! Delegate factory for runtime backend selection

use std::sync::Arc;

use tracing::info;

use crate::domain::storage::{Entity, ModelDelegate};
use crate::domain::DomainError;

use super::in_memory::InMemoryDelegate;
use super::postgres::{PostgresConfig, PostgresDelegate};

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "memory",
            Self::Postgres => "postgres",
        }
    }
}

impl std::str::FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            DomainError::configuration(format!("Unknown storage backend '{}'", s))
        })
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// In-memory storage configuration
    InMemory,
    /// PostgreSQL storage configuration
    Postgres(PostgresConfig),
}

impl StorageConfig {
    /// Creates an in-memory storage configuration
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    /// Creates a PostgreSQL storage configuration
    pub fn postgres(config: PostgresConfig) -> Self {
        Self::Postgres(config)
    }

    /// Creates a PostgreSQL configuration from a URL
    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::Postgres(PostgresConfig::new(url))
    }

    /// Returns the storage type
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }
}

/// Factory for creating model delegates
#[derive(Debug)]
pub struct DelegateFactory;

impl DelegateFactory {
    /// Creates a delegate for `E` based on the configuration
    ///
    /// PostgreSQL delegates use the model identifier as table name and have
    /// their table ensured before being returned.
    pub async fn create<E>(config: &StorageConfig) -> Result<Arc<dyn ModelDelegate<E>>, DomainError>
    where
        E: Entity,
    {
        info!(
            model = E::MODEL,
            backend = config.storage_type().as_str(),
            "Creating model delegate"
        );

        let delegate: Arc<dyn ModelDelegate<E>> = match config {
            StorageConfig::InMemory => Self::create_in_memory::<E>(),
            StorageConfig::Postgres(pg_config) => {
                Self::create_postgres::<E>(pg_config, E::MODEL).await?
            }
        };

        Ok(delegate)
    }

    /// Creates an in-memory delegate
    pub fn create_in_memory<E>() -> Arc<InMemoryDelegate<E>>
    where
        E: Entity,
    {
        Arc::new(InMemoryDelegate::new())
    }

    /// Creates a PostgreSQL delegate
    pub async fn create_postgres<E>(
        config: &PostgresConfig,
        table_name: &str,
    ) -> Result<Arc<PostgresDelegate<E>>, DomainError>
    where
        E: Entity,
    {
        let delegate = PostgresDelegate::connect(config, table_name).await?;
        delegate.ensure_table().await?;
        Ok(Arc::new(delegate))
    }
}

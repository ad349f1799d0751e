//! PostgreSQL delegate implementation with connection pooling

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::domain::storage::{
    BatchCount, CountArgs, CreateArgs, DeleteArgs, DeleteManyArgs, Entity, EntityId, FieldKey,
    FieldName, FindManyOptions, FindUniqueArgs, Include, ModelDelegate, OrderBy, UpdateArgs,
    UpdateManyArgs, UpsertArgs, UPDATED_AT_FIELD,
};
use crate::domain::DomainError;

use super::document::{self, Document};

/// Tie-break applied after caller ordering and for single-record targets
const STORAGE_ORDER: &str = "created_at ASC, id ASC";

/// Merges patch `$2` at time `$3`; a stored `updated_at` newer than `$3` is kept
const MERGE_PATCH: &str = "data = data || $2 || CASE WHEN updated_at > $3 \
    THEN jsonb_build_object('updated_at', data->'updated_at') ELSE '{}'::jsonb END, \
    updated_at = GREATEST(updated_at, $3)";

/// PostgreSQL delegate configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/entity_repository".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }
}

/// Connects a pool using the given configuration
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| map_sqlx_error("Failed to connect to PostgreSQL", e))
}

/// Maps sqlx failures onto the delegate error taxonomy
pub fn map_sqlx_error(context: &str, err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            DomainError::constraint_violation(format!("{}: {}", context, db.message()))
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            DomainError::connection_failure(format!("{}: {}", context, err))
        }
        _ => DomainError::storage(format!("{}: {}", context, err)),
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn validate_identifier(name: &str) -> Result<(), DomainError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 63 {
        Ok(())
    } else {
        Err(DomainError::configuration(format!(
            "Invalid table name '{}'",
            name
        )))
    }
}

fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn order_expression<F: FieldName>(key: &FieldKey<F>) -> String {
    match key {
        FieldKey::Id => "id".to_string(),
        FieldKey::CreatedAt => "created_at".to_string(),
        FieldKey::UpdatedAt => "updated_at".to_string(),
        FieldKey::Field(field) => format!("data->'{}'", quote_literal(field.name())),
    }
}

/// Builds an ORDER BY clause; caller terms first, storage order last
fn order_clause<F: FieldName>(order_by: &[OrderBy<F>]) -> String {
    let terms: Vec<String> = order_by
        .iter()
        .map(|term| format!("{} {}", order_expression(&term.key), term.order.as_sql()))
        .chain(std::iter::once(STORAGE_ORDER.to_string()))
        .collect();

    format!(" ORDER BY {}", terms.join(", "))
}

/// Current time at TIMESTAMPTZ precision, so JSONB and column timestamps agree
fn storage_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn to_i64(value: Option<usize>) -> Option<i64> {
    value.map(|v| i64::try_from(v).unwrap_or(i64::MAX))
}

/// PostgreSQL delegate
///
/// Stores each entity as a JSONB document in a per-model table with
/// (id, data, created_at, updated_at) columns. Criteria are evaluated with
/// JSON containment (`data @> criteria`); several matches resolve to the
/// oldest record (`created_at`, then `id`).
pub struct PostgresDelegate<E>
where
    E: Entity,
{
    pool: PgPool,
    table_name: String,
    _phantom: PhantomData<E>,
}

impl<E> Debug for PostgresDelegate<E>
where
    E: Entity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDelegate")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl<E> PostgresDelegate<E>
where
    E: Entity,
{
    /// Creates a delegate over an existing pool
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Result<Self, DomainError> {
        let table_name = table_name.into();
        validate_identifier(&table_name)?;

        Ok(Self {
            pool,
            table_name,
            _phantom: PhantomData,
        })
    }

    /// Creates a delegate with its own connection pool
    pub async fn connect(
        config: &PostgresConfig,
        table_name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let pool = connect_pool(config).await?;
        Self::new(pool, table_name)
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Ensures the model table and its unique indexes exist
    pub async fn ensure_table(&self) -> Result<(), DomainError> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(64) PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table_name
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to create table", e))?;

        for field in E::unique_fields() {
            let name = field.name();
            let index = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {}_{}_key ON {} ((data->>'{}'))",
                self.table_name,
                name,
                self.table_name,
                quote_literal(name)
            );

            sqlx::query(&index)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("Failed to create unique index", e))?;
        }

        Ok(())
    }

    /// Subquery selecting the id of the first record matching `$1`
    fn first_match(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE data @> $1 ORDER BY {} LIMIT 1",
            self.table_name, STORAGE_ORDER
        )
    }

    fn decode_row(row: &PgRow, include: &Include<E::Relation>) -> Result<E, DomainError> {
        let data: Value = row
            .try_get("data")
            .map_err(|e| map_sqlx_error("Failed to read entity data", e))?;

        match data {
            Value::Object(document) => document::decode(document, include),
            _ => Err(DomainError::serialization(format!(
                "Stored {} record is not an object",
                E::MODEL
            ))),
        }
    }

    fn patch_document(patch: &E::Patch) -> Result<(Document, DateTime<Utc>), DomainError> {
        let now = storage_now();
        let mut document = document::payload_object(E::MODEL, patch)?;
        document.insert(UPDATED_AT_FIELD.to_string(), serde_json::to_value(now)?);
        Ok((document, now))
    }

    fn not_found(criteria: &Document) -> DomainError {
        DomainError::not_found(format!(
            "No {} record matches {}",
            E::MODEL,
            Value::Object(criteria.clone())
        ))
    }

    async fn select(
        &self,
        args: &FindManyOptions<E>,
        take: Option<usize>,
    ) -> Result<Vec<E>, DomainError> {
        let query = format!(
            "SELECT data FROM {} WHERE data @> $1{} LIMIT $2 OFFSET $3",
            self.table_name,
            order_clause(&args.order_by)
        );

        let rows = sqlx::query(&query)
            .bind(Value::Object(args.filter.to_document()))
            .bind(to_i64(take))
            .bind(to_i64(args.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to list entities", e))?;

        rows.iter()
            .map(|row| Self::decode_row(row, &args.include))
            .collect()
    }
}

#[async_trait]
impl<E> ModelDelegate<E> for PostgresDelegate<E>
where
    E: Entity,
{
    async fn create(&self, args: CreateArgs<E>) -> Result<E, DomainError> {
        let id = EntityId::generate();
        let now = storage_now();
        let mut data = document::payload_object(E::MODEL, &args.data)?;
        document::stamp_new(&mut data, &id, now)?;

        let query = format!(
            r#"
            INSERT INTO {} (id, data, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            "#,
            self.table_name
        );

        sqlx::query(&query)
            .bind(id.as_str())
            .bind(Value::Object(data.clone()))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to create entity", e))?;

        debug!(table = %self.table_name, id = %id, "Created record");
        document::decode(data, &Include::none())
    }

    async fn find_many(&self, args: FindManyOptions<E>) -> Result<Vec<E>, DomainError> {
        self.select(&args, args.take).await
    }

    async fn find_unique(&self, args: FindUniqueArgs<E>) -> Result<Option<E>, DomainError> {
        let query = format!(
            "SELECT data FROM {} WHERE data @> $1 ORDER BY {} LIMIT 1",
            self.table_name, STORAGE_ORDER
        );

        let row = sqlx::query(&query)
            .bind(Value::Object(args.filter.to_document()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to get entity", e))?;

        row.map(|row| Self::decode_row(&row, &args.include))
            .transpose()
    }

    async fn find_first(&self, args: FindManyOptions<E>) -> Result<Option<E>, DomainError> {
        Ok(self.select(&args, Some(1)).await?.into_iter().next())
    }

    async fn update(&self, args: UpdateArgs<E>) -> Result<E, DomainError> {
        let criteria = args.filter.to_document();
        let (patch, now) = Self::patch_document(&args.data)?;

        let query = format!(
            r#"
            UPDATE {} SET {}
            WHERE id = ({})
            RETURNING data
            "#,
            self.table_name,
            MERGE_PATCH,
            self.first_match()
        );

        let row = sqlx::query(&query)
            .bind(Value::Object(criteria.clone()))
            .bind(Value::Object(patch))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to update entity", e))?
            .ok_or_else(|| Self::not_found(&criteria))?;

        let updated = Self::decode_row(&row, &Include::none())?;
        debug!(table = %self.table_name, id = %updated.id(), "Updated record");
        Ok(updated)
    }

    async fn update_many(&self, args: UpdateManyArgs<E>) -> Result<BatchCount, DomainError> {
        let (patch, now) = Self::patch_document(&args.data)?;

        let query = format!(
            r#"
            UPDATE {} SET {}
            WHERE data @> $1
            "#,
            self.table_name,
            MERGE_PATCH
        );

        let result = sqlx::query(&query)
            .bind(Value::Object(args.filter.to_document()))
            .bind(Value::Object(patch))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to update entities", e))?;

        debug!(table = %self.table_name, count = result.rows_affected(), "Updated records");
        Ok(BatchCount::new(result.rows_affected()))
    }

    async fn delete(&self, args: DeleteArgs<E>) -> Result<E, DomainError> {
        let criteria = args.filter.to_document();

        let query = format!(
            "DELETE FROM {} WHERE id = ({}) RETURNING data",
            self.table_name,
            self.first_match()
        );

        let row = sqlx::query(&query)
            .bind(Value::Object(criteria.clone()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to delete entity", e))?
            .ok_or_else(|| Self::not_found(&criteria))?;

        let deleted = Self::decode_row(&row, &Include::none())?;
        debug!(table = %self.table_name, id = %deleted.id(), "Deleted record");
        Ok(deleted)
    }

    async fn delete_many(&self, args: DeleteManyArgs<E>) -> Result<BatchCount, DomainError> {
        let query = format!("DELETE FROM {} WHERE data @> $1", self.table_name);

        let result = sqlx::query(&query)
            .bind(Value::Object(args.filter.to_document()))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to delete entities", e))?;

        debug!(table = %self.table_name, count = result.rows_affected(), "Deleted records");
        Ok(BatchCount::new(result.rows_affected()))
    }

    async fn count(&self, args: CountArgs<E>) -> Result<u64, DomainError> {
        let query = format!(
            "SELECT COUNT(*) as count FROM {} WHERE data @> $1",
            self.table_name
        );

        let count: i64 = sqlx::query_scalar(&query)
            .bind(Value::Object(args.filter.to_document()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to count entities", e))?;

        Ok(count.max(0) as u64)
    }

    async fn upsert(&self, args: UpsertArgs<E>) -> Result<E, DomainError> {
        let criteria = Value::Object(args.filter.to_document());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("Failed to begin transaction", e))?;

        let lookup = format!("{} FOR UPDATE", self.first_match());
        let existing: Option<String> = sqlx::query_scalar(&lookup)
            .bind(&criteria)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("Failed to look up entity", e))?;

        let data = match existing {
            Some(id) => {
                let (patch, now) = Self::patch_document(&args.update)?;
                let query = format!(
                    r#"
                    UPDATE {} SET {}
                    WHERE id = $1
                    RETURNING data
                    "#,
                    self.table_name,
                    MERGE_PATCH
                );

                let row = sqlx::query(&query)
                    .bind(&id)
                    .bind(Value::Object(patch))
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("Failed to update entity", e))?;

                debug!(table = %self.table_name, id = %id, "Upsert updated record");
                Self::decode_row(&row, &Include::none())?
            }
            None => {
                let id = EntityId::generate();
                let now = storage_now();
                let mut data = document::payload_object(E::MODEL, &args.create)?;
                document::stamp_new(&mut data, &id, now)?;

                let query = format!(
                    r#"
                    INSERT INTO {} (id, data, created_at, updated_at)
                    VALUES ($1, $2, $3, $3)
                    "#,
                    self.table_name
                );

                sqlx::query(&query)
                    .bind(id.as_str())
                    .bind(Value::Object(data.clone()))
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("Failed to create entity", e))?;

                debug!(table = %self.table_name, id = %id, "Upsert created record");
                document::decode(data, &Include::none())?
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("Failed to commit transaction", e))?;

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::fixtures::{StockField, StockRelation};

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.idle_timeout_secs, 600);
    }

    #[test]
    fn test_postgres_config_builder() {
        let config = PostgresConfig::new("postgres://localhost/test")
            .with_max_connections(20)
            .with_min_connections(5)
            .with_connect_timeout(60)
            .with_idle_timeout(300);

        assert_eq!(config.url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connect_timeout_secs, 60);
        assert_eq!(config.idle_timeout_secs, 300);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("stock").is_ok());
        assert!(validate_identifier("_stock_v2").is_ok());
        assert!(validate_identifier("2stock").is_err());
        assert!(validate_identifier("stock; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_order_clause_appends_storage_order() {
        let clause = order_clause(&[
            OrderBy::desc(StockField::Quantity),
            OrderBy::asc(FieldKey::<StockField>::UpdatedAt),
        ]);

        assert_eq!(
            clause,
            " ORDER BY data->'quantity' DESC, updated_at ASC, created_at ASC, id ASC"
        );
        assert_eq!(
            order_clause::<StockRelation>(&[]),
            " ORDER BY created_at ASC, id ASC"
        );
    }

    #[test]
    fn test_map_sqlx_error_connection_failures() {
        assert!(map_sqlx_error("ctx", sqlx::Error::PoolTimedOut).is_connection_failure());
        assert!(map_sqlx_error("ctx", sqlx::Error::PoolClosed).is_connection_failure());
        assert!(matches!(
            map_sqlx_error("ctx", sqlx::Error::RowNotFound),
            DomainError::Storage { .. }
        ));
    }

    #[test]
    fn test_merge_patch_keeps_newer_updated_at() {
        assert!(MERGE_PATCH.starts_with("data = data || $2 || CASE WHEN updated_at > $3"));
        assert!(MERGE_PATCH.contains("jsonb_build_object('updated_at', data->'updated_at')"));
        assert!(MERGE_PATCH.ends_with("updated_at = GREATEST(updated_at, $3)"));
        assert!(!MERGE_PATCH.contains("  "));
    }

    #[test]
    fn test_storage_now_has_microsecond_precision() {
        assert_eq!(storage_now().timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_to_i64_saturates() {
        assert_eq!(to_i64(None), None);
        assert_eq!(to_i64(Some(5)), Some(5));
        assert_eq!(to_i64(Some(usize::MAX)), Some(i64::MAX));
    }
}

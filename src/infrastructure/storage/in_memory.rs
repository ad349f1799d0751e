//! In-memory delegate implementation

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::domain::storage::{
    BatchCount, CountArgs, CreateArgs, DeleteArgs, DeleteManyArgs, Entity, EntityId, FieldName,
    FindManyOptions, FindUniqueArgs, Include, ModelDelegate, OrderBy, SortOrder, UpdateArgs,
    UpdateManyArgs, UpsertArgs,
};
use crate::domain::DomainError;

use super::document::{self, Document};

/// Thread-safe in-memory delegate
///
/// Records keep insertion order, which is also the tie-break whenever
/// criteria match several records. Data is lost when the process terminates.
pub struct InMemoryDelegate<E>
where
    E: Entity,
{
    records: RwLock<Vec<Document>>,
    _phantom: PhantomData<E>,
}

impl<E> Debug for InMemoryDelegate<E>
where
    E: Entity,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.records.read().map(|r| r.len()).unwrap_or_default();
        f.debug_struct("InMemoryDelegate")
            .field("model", &E::MODEL)
            .field("records", &len)
            .finish()
    }
}

impl<E> Default for InMemoryDelegate<E>
where
    E: Entity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryDelegate<E>
where
    E: Entity,
{
    /// Creates a new empty delegate
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            _phantom: PhantomData,
        }
    }

    /// Creates a delegate pre-populated with existing entities, kept as given
    pub fn with_entities(entities: Vec<E>) -> Result<Self, DomainError> {
        let mut records = Vec::with_capacity(entities.len());

        for entity in entities {
            match serde_json::to_value(&entity)? {
                Value::Object(document) => records.push(document),
                _ => {
                    return Err(DomainError::validation(format!(
                        "{} entities must serialize to objects",
                        E::MODEL
                    )))
                }
            }
        }

        Self::ensure_unique(&records)?;

        Ok(Self {
            records: RwLock::new(records),
            _phantom: PhantomData,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Document>>, DomainError> {
        self.records
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Document>>, DomainError> {
        self.records
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }

    /// Indices of matching records, sorted by `order_by` (stable)
    fn select(
        records: &[Document],
        criteria: &Document,
        order_by: &[OrderBy<E::Field>],
    ) -> Vec<usize> {
        let mut indices: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| document::matches(record, criteria))
            .map(|(index, _)| index)
            .collect();

        if !order_by.is_empty() {
            indices.sort_by(|a, b| {
                order_by
                    .iter()
                    .map(|term| {
                        let key = term.key.name();
                        let left = records[*a].get(key).unwrap_or(&Value::Null);
                        let right = records[*b].get(key).unwrap_or(&Value::Null);
                        let ordering = document::compare_values(key, left, right);
                        match term.order {
                            SortOrder::Asc => ordering,
                            SortOrder::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        indices
    }

    fn page(indices: Vec<usize>, skip: Option<usize>, take: Option<usize>) -> Vec<usize> {
        indices
            .into_iter()
            .skip(skip.unwrap_or(0))
            .take(take.unwrap_or(usize::MAX))
            .collect()
    }

    fn unique_conflict(field: &str, value: &Value) -> DomainError {
        DomainError::constraint_violation(format!(
            "Unique constraint failed on {}.{} for value {}",
            E::MODEL,
            field,
            value
        ))
    }

    fn unique_value<'a>(record: &'a Document, field: &str) -> Option<&'a Value> {
        record.get(field).filter(|value| !value.is_null())
    }

    /// Hash key for a unique value; string values are borrowed
    fn unique_key(value: &Value) -> (bool, Cow<'_, str>) {
        match value {
            Value::String(s) => (true, Cow::Borrowed(s.as_str())),
            other => (false, Cow::Owned(other.to_string())),
        }
    }

    /// Rejects a record set in which two records share a unique field value
    fn ensure_unique(records: &[Document]) -> Result<(), DomainError> {
        for field in E::unique_fields() {
            let mut seen = HashSet::new();

            for value in records.iter().filter_map(|r| Self::unique_value(r, field.name())) {
                if !seen.insert(Self::unique_key(value)) {
                    return Err(Self::unique_conflict(field.name(), value));
                }
            }
        }

        Ok(())
    }

    /// Checks `replacements` (index, document) against each other and the untouched records
    ///
    /// An index equal to `records.len()` denotes a record being appended.
    fn ensure_unique_with(
        records: &[Document],
        replacements: &[(usize, Document)],
    ) -> Result<(), DomainError> {
        let replaced: HashSet<usize> = replacements.iter().map(|(index, _)| *index).collect();

        for field in E::unique_fields() {
            let name = field.name();
            let mut incoming = HashSet::new();

            for value in replacements
                .iter()
                .filter_map(|(_, record)| Self::unique_value(record, name))
            {
                if !incoming.insert(Self::unique_key(value)) {
                    return Err(Self::unique_conflict(name, value));
                }
            }

            if incoming.is_empty() {
                continue;
            }

            let conflict = records
                .iter()
                .enumerate()
                .filter(|(index, _)| !replaced.contains(index))
                .filter_map(|(_, record)| Self::unique_value(record, name))
                .find(|value| incoming.contains(&Self::unique_key(value)));

            if let Some(value) = conflict {
                return Err(Self::unique_conflict(name, value));
            }
        }

        Ok(())
    }

    fn insert_draft(records: &mut Vec<Document>, draft: &E::Draft) -> Result<E, DomainError> {
        let mut created = document::payload_object(E::MODEL, draft)?;
        let id = EntityId::generate();
        document::stamp_new(&mut created, &id, Utc::now())?;

        let appended = [(records.len(), created)];
        Self::ensure_unique_with(records, &appended)?;
        let [(_, created)] = appended;
        records.push(created.clone());

        debug!(model = E::MODEL, id = %id, "Created record");
        document::decode(created, &Include::none())
    }

    /// Applies `patch` to the records at `indices`; nothing changes on failure
    fn patch_all(
        records: &mut [Document],
        indices: &[usize],
        patch: &E::Patch,
    ) -> Result<Vec<usize>, DomainError> {
        let patch = document::payload_object(E::MODEL, patch)?;
        let now = Utc::now();

        let mut patched = Vec::with_capacity(indices.len());
        for index in indices {
            let mut record = records[*index].clone();
            document::apply_patch(&mut record, &patch, now)?;
            patched.push((*index, record));
        }

        Self::ensure_unique_with(records, &patched)?;

        Ok(patched
            .into_iter()
            .map(|(index, record)| {
                records[index] = record;
                index
            })
            .collect())
    }

    fn patch_at(
        records: &mut [Document],
        index: usize,
        patch: &E::Patch,
    ) -> Result<E, DomainError> {
        Self::patch_all(records, &[index], patch)?;
        document::decode(records[index].clone(), &Include::none())
    }

    fn not_found(criteria: &Document) -> DomainError {
        DomainError::not_found(format!(
            "No {} record matches {}",
            E::MODEL,
            Value::Object(criteria.clone())
        ))
    }
}

#[async_trait]
impl<E> ModelDelegate<E> for InMemoryDelegate<E>
where
    E: Entity,
{
    async fn create(&self, args: CreateArgs<E>) -> Result<E, DomainError> {
        let mut records = self.write()?;
        Self::insert_draft(&mut records, &args.data)
    }

    async fn find_many(&self, args: FindManyOptions<E>) -> Result<Vec<E>, DomainError> {
        let records = self.read()?;
        let criteria = args.filter.to_document();
        let indices = Self::page(
            Self::select(&records, &criteria, &args.order_by),
            args.skip,
            args.take,
        );

        indices
            .into_iter()
            .map(|index| document::decode(records[index].clone(), &args.include))
            .collect()
    }

    async fn find_unique(&self, args: FindUniqueArgs<E>) -> Result<Option<E>, DomainError> {
        let records = self.read()?;
        let criteria = args.filter.to_document();

        Self::select(&records, &criteria, &[])
            .first()
            .map(|index| document::decode(records[*index].clone(), &args.include))
            .transpose()
    }

    async fn find_first(&self, args: FindManyOptions<E>) -> Result<Option<E>, DomainError> {
        let records = self.read()?;
        let criteria = args.filter.to_document();
        let indices = Self::page(
            Self::select(&records, &criteria, &args.order_by),
            args.skip,
            Some(1),
        );

        indices
            .first()
            .map(|index| document::decode(records[*index].clone(), &args.include))
            .transpose()
    }

    async fn update(&self, args: UpdateArgs<E>) -> Result<E, DomainError> {
        let mut records = self.write()?;
        let criteria = args.filter.to_document();

        let index = Self::select(&records, &criteria, &[])
            .first()
            .copied()
            .ok_or_else(|| Self::not_found(&criteria))?;

        let updated = Self::patch_at(&mut records, index, &args.data)?;
        debug!(model = E::MODEL, id = %updated.id(), "Updated record");
        Ok(updated)
    }

    async fn update_many(&self, args: UpdateManyArgs<E>) -> Result<BatchCount, DomainError> {
        let mut records = self.write()?;
        let criteria = args.filter.to_document();
        let indices = Self::select(&records, &criteria, &[]);

        let updated = Self::patch_all(&mut records, &indices, &args.data)?;

        debug!(model = E::MODEL, count = updated.len(), "Updated records");
        Ok(BatchCount::new(updated.len() as u64))
    }

    async fn delete(&self, args: DeleteArgs<E>) -> Result<E, DomainError> {
        let mut records = self.write()?;
        let criteria = args.filter.to_document();

        let index = Self::select(&records, &criteria, &[])
            .first()
            .copied()
            .ok_or_else(|| Self::not_found(&criteria))?;

        let removed = records.remove(index);
        let deleted: E = document::decode(removed, &Include::none())?;
        debug!(model = E::MODEL, id = %deleted.id(), "Deleted record");
        Ok(deleted)
    }

    async fn delete_many(&self, args: DeleteManyArgs<E>) -> Result<BatchCount, DomainError> {
        let mut records = self.write()?;
        let criteria = args.filter.to_document();

        let before = records.len();
        records.retain(|record| !document::matches(record, &criteria));
        let count = (before - records.len()) as u64;

        debug!(model = E::MODEL, count, "Deleted records");
        Ok(BatchCount::new(count))
    }

    async fn count(&self, args: CountArgs<E>) -> Result<u64, DomainError> {
        let records = self.read()?;
        let criteria = args.filter.to_document();

        Ok(records
            .iter()
            .filter(|record| document::matches(record, &criteria))
            .count() as u64)
    }

    async fn upsert(&self, args: UpsertArgs<E>) -> Result<E, DomainError> {
        let mut records = self.write()?;
        let criteria = args.filter.to_document();

        match Self::select(&records, &criteria, &[]).first().copied() {
            Some(index) => Self::patch_at(&mut records, index, &args.update),
            None => Self::insert_draft(&mut records, &args.create),
        }
    }
}

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageErrorKind};
use crate::model::{key_of, Relationship, Resource, Scope, ValueType};
use crate::store::{FilterEvaluator, Repository};

/// Repository keeping every collection in memory, keyed by collection name.
/// Relationships are stored as related keys only.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    collections: Arc<RwLock<HashMap<String, Vec<Resource>>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-filled with the given rows.
    pub fn with_collections(collections: HashMap<String, Vec<Resource>>) -> Self {
        Self {
            collections: Arc::new(RwLock::new(collections)),
        }
    }

    /// Stores a resource as is, replacing one with the same key.
    pub async fn insert(&self, collection: &str, resource: Resource) {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.to_string()).or_default();
        let key = key_of(&resource.id);
        rows.retain(|r| key_of(&r.id) != key);
        rows.push(resource);
    }

    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, |rows| rows.len())
    }

    fn next_id(rows: &[Resource], value_type: ValueType) -> Value {
        match value_type {
            ValueType::Integer => {
                let max = rows.iter().filter_map(|r| r.id.as_i64()).max().unwrap_or(0);
                Value::from(max + 1)
            }
            _ => Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }

    fn matching(rows: &[Resource], scope: &Scope) -> Result<Vec<usize>, StorageError> {
        let mut positions = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if FilterEvaluator::matches(row, scope)? {
                positions.push(i);
            }
        }
        Ok(positions)
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryRepository {
    async fn create(&self, scope: &mut Scope) -> Result<(), StorageError> {
        let value_type = scope.model().primary().value_type;
        let collection = scope.collection().to_string();
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.clone()).or_default();

        let resource = scope
            .value_single_mut()
            .map_err(|e| StorageError::new(StorageErrorKind::Internal, e.to_string()))?;
        if !resource.has_id() {
            resource.id = Self::next_id(rows, value_type);
        }

        let key = key_of(&resource.id);
        if rows.iter().any(|r| key_of(&r.id) == key) {
            return Err(StorageError::new(
                StorageErrorKind::UniqueViolation,
                format!("{} '{}' already exists", collection, key),
            ));
        }

        rows.push(resource.clone());
        Ok(())
    }

    async fn get(&self, scope: &mut Scope) -> Result<(), StorageError> {
        let collections = self.collections.read().await;
        let rows = collections
            .get(scope.collection())
            .map(|rows| rows.as_slice())
            .unwrap_or_default();

        let position = Self::matching(rows, scope)?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::no_result(format!("no {} matches", scope.collection())))?;

        let mut resource = rows[position].clone();
        resource.project(&scope.fieldset);
        scope.new_value_single(resource);
        Ok(())
    }

    async fn list(&self, scope: &mut Scope) -> Result<(), StorageError> {
        let collections = self.collections.read().await;
        let rows = collections
            .get(scope.collection())
            .map(|rows| rows.as_slice())
            .unwrap_or_default();

        let mut found: Vec<Resource> = Self::matching(rows, scope)?
            .into_iter()
            .map(|i| rows[i].clone())
            .collect();
        FilterEvaluator::sort(&mut found, &scope.sorts);

        if scope.count_list {
            scope.total = Some(found.len());
        }

        if let Some(pagination) = &scope.pagination {
            let offset = pagination.offset.unwrap_or(0);
            found = found
                .into_iter()
                .skip(offset)
                .take(pagination.limit.unwrap_or(usize::MAX))
                .collect();
        }

        for resource in found.iter_mut() {
            resource.project(&scope.fieldset);
        }
        scope.value = crate::model::ScopeValue::Many(found);
        Ok(())
    }

    async fn patch(&self, scope: &mut Scope) -> Result<(), StorageError> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(scope.collection().to_string()).or_default();

        let position = Self::matching(rows, scope)?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::no_result(format!("no {} matches", scope.collection())))?;

        let changes = scope
            .value_single()
            .map_err(|e| StorageError::new(StorageErrorKind::Internal, e.to_string()))?
            .clone();
        let stored = &mut rows[position];
        for (name, value) in changes.attributes {
            stored.attributes.insert(name, value);
        }
        for (name, relationship) in changes.relationships {
            let relationship = match relationship {
                Relationship::ToOne(related) => {
                    Relationship::ToOne(related.map(|r| Box::new(r.identifier())))
                }
                Relationship::ToMany(related) => {
                    Relationship::ToMany(related.iter().map(Resource::identifier).collect())
                }
            };
            stored.relationships.insert(name, relationship);
        }

        if scope.get_modified_result {
            let mut modified = stored.clone();
            modified.project(&scope.fieldset);
            scope.new_value_single(modified);
        }
        Ok(())
    }

    async fn delete(&self, scope: &mut Scope) -> Result<(), StorageError> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(scope.collection().to_string()).or_default();

        let positions = Self::matching(rows, scope)?;
        if positions.is_empty() {
            return Err(StorageError::no_result(format!(
                "no {} matches",
                scope.collection()
            )));
        }

        let mut index = 0;
        rows.retain(|_| {
            let keep = !positions.contains(&index);
            index += 1;
            keep
        });
        Ok(())
    }
}

use itertools::Itertools;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{
    key_of, FieldKind, FilterField, ModelRegistry, ModelStruct, Operator, Pagination, Resource,
    SortField, StructField,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("scope of '{0}' holds no value")]
    NoValue(String),
    #[error("scope of '{collection}' holds a value of the wrong kind, expected {expected}")]
    ValueKind {
        collection: String,
        expected: &'static str,
    },
    #[error("collection '{collection}' has no field '{field}'")]
    FieldNotFound { collection: String, field: String },
    #[error("field '{collection}.{field}' is not exposed")]
    HiddenField { collection: String, field: String },
    #[error("field '{collection}.{field}' is not a relationship")]
    NotRelationship { collection: String, field: String },
    #[error("no model registered for collection '{0}'")]
    ModelNotFound(String),
    #[error("collection '{0}' has no language field")]
    NoLanguageField(String),
    #[error("scope of '{0}' has no current included field")]
    NoIncludedField(String),
}

/// Materialized value of a scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScopeValue {
    #[default]
    Empty,
    Single(Resource),
    Many(Vec<Resource>),
}

/// One requested inclusion: the relationship and the scope its related
/// resources are fetched into.
#[derive(Debug, Clone)]
pub struct IncludeField {
    pub field: StructField,
    pub scope: Scope,
}

/// Query descriptor for one resource type within one request.
#[derive(Debug, Clone)]
pub struct Scope {
    model: Arc<ModelStruct>,
    pub value: ScopeValue,
    pub primary_filters: Vec<FilterField>,
    pub attribute_filters: Vec<FilterField>,
    pub relationship_filters: Vec<FilterField>,
    pub language_filter: Option<FilterField>,
    pub fieldset: BTreeSet<String>,
    pub included_fields: Vec<IncludeField>,
    include_cursor: Option<usize>,
    pub sorts: Vec<SortField>,
    pub pagination: Option<Pagination>,
    pub count_list: bool,
    pub total: Option<usize>,
    pub get_modified_result: bool,
    is_root: bool,
}

impl Scope {
    /// Root scope selecting every visible field of the model.
    pub fn new(model: Arc<ModelStruct>) -> Self {
        let fieldset = model
            .fields()
            .iter()
            .filter(|f| !f.hidden)
            .map(|f| f.name.clone())
            .collect();
        Self {
            model,
            value: ScopeValue::Empty,
            primary_filters: Vec::new(),
            attribute_filters: Vec::new(),
            relationship_filters: Vec::new(),
            language_filter: None,
            fieldset,
            included_fields: Vec::new(),
            include_cursor: None,
            sorts: Vec::new(),
            pagination: None,
            count_list: false,
            total: None,
            get_modified_result: false,
            is_root: true,
        }
    }

    /// Subordinate scope that selects no fields. Only keys come back.
    pub fn new_keys_only(model: Arc<ModelStruct>) -> Self {
        let mut scope = Self::new(model);
        scope.fieldset.clear();
        scope.is_root = false;
        scope
    }

    fn new_included(model: Arc<ModelStruct>) -> Self {
        let mut scope = Self::new(model);
        scope.is_root = false;
        scope
    }

    pub fn model(&self) -> &Arc<ModelStruct> {
        &self.model
    }

    pub fn collection(&self) -> &str {
        self.model.collection()
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn new_value_single(&mut self, resource: Resource) {
        self.value = ScopeValue::Single(resource);
    }

    pub fn new_value_many(&mut self) {
        self.value = ScopeValue::Many(Vec::new());
    }

    pub fn value_single(&self) -> Result<&Resource, ScopeError> {
        match &self.value {
            ScopeValue::Single(resource) => Ok(resource),
            ScopeValue::Empty => Err(ScopeError::NoValue(self.collection().to_string())),
            ScopeValue::Many(_) => Err(self.kind_error("a single resource")),
        }
    }

    pub fn value_single_mut(&mut self) -> Result<&mut Resource, ScopeError> {
        let err = self.kind_error("a single resource");
        match &mut self.value {
            ScopeValue::Single(resource) => Ok(resource),
            ScopeValue::Empty => Err(ScopeError::NoValue(self.model.collection().to_string())),
            ScopeValue::Many(_) => Err(err),
        }
    }

    pub fn value_many_mut(&mut self) -> Result<&mut Vec<Resource>, ScopeError> {
        let err = self.kind_error("a collection");
        match &mut self.value {
            ScopeValue::Many(resources) => Ok(resources),
            ScopeValue::Empty => Err(ScopeError::NoValue(self.model.collection().to_string())),
            ScopeValue::Single(_) => Err(err),
        }
    }

    fn kind_error(&self, expected: &'static str) -> ScopeError {
        ScopeError::ValueKind {
            collection: self.collection().to_string(),
            expected,
        }
    }

    /// Every materialized resource, whatever the value kind.
    pub fn resources(&self) -> Vec<&Resource> {
        match &self.value {
            ScopeValue::Empty => Vec::new(),
            ScopeValue::Single(resource) => vec![resource],
            ScopeValue::Many(resources) => resources.iter().collect(),
        }
    }

    /// Primary keys of the materialized value.
    pub fn primary_values(&self) -> Vec<Value> {
        self.resources()
            .into_iter()
            .filter(|r| r.has_id())
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn field(&self, name: &str) -> Result<&StructField, ScopeError> {
        self.model
            .field(name)
            .ok_or_else(|| ScopeError::FieldNotFound {
                collection: self.collection().to_string(),
                field: name.to_string(),
            })
    }

    /// Adds a filter to the list matching its field kind.
    pub fn add_filter_field(&mut self, filter: FilterField) {
        match filter.kind() {
            FieldKind::Primary => self.primary_filters.push(filter),
            FieldKind::Attribute if filter.field.langtag && self.model.use_i18n() => {
                self.language_filter = Some(filter)
            }
            FieldKind::Attribute => self.attribute_filters.push(filter),
            FieldKind::RelationshipSingle | FieldKind::RelationshipMultiple => {
                self.relationship_filters.push(filter)
            }
        }
    }

    /// Restricts the scope to the given primary keys.
    pub fn set_id_filters(&mut self, ids: Vec<Value>) {
        let filter = FilterField::new(self.model.primary().clone()).with_values(Operator::In, ids);
        self.primary_filters.push(filter);
    }

    pub fn set_language_filter(&mut self, tags: Vec<String>) -> Result<(), ScopeError> {
        let field = self
            .model
            .language_field()
            .cloned()
            .ok_or_else(|| ScopeError::NoLanguageField(self.collection().to_string()))?;
        let values = tags.into_iter().map(Value::String).collect();
        self.language_filter = Some(FilterField::new(field).with_values(Operator::In, values));
        Ok(())
    }

    /// Language tag of a single value, when the model is locale-aware.
    pub fn langtag(&self) -> Option<String> {
        let field = self.model.language_field()?;
        let resource = self.value_single().ok()?;
        resource
            .attributes
            .get(&field.name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn set_langtag(&mut self, tag: &str) -> Result<(), ScopeError> {
        let field = self
            .model
            .language_field()
            .cloned()
            .ok_or_else(|| ScopeError::NoLanguageField(self.collection().to_string()))?;
        self.value_single_mut()?
            .set_value(&field, Value::String(tag.to_string()));
        Ok(())
    }

    /// Adds an inclusion path such as `post.comments`. The first segment must
    /// be a relationship of this scope's model; the rest is resolved against
    /// the related model.
    pub fn include(&mut self, registry: &ModelRegistry, path: &str) -> Result<(), ScopeError> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let field = self.field(head)?.clone();
        if field.hidden {
            return Err(ScopeError::HiddenField {
                collection: self.collection().to_string(),
                field: head.to_string(),
            });
        }
        let related = match (&field.related, field.is_relationship()) {
            (Some(related), true) => related.clone(),
            _ => {
                return Err(ScopeError::NotRelationship {
                    collection: self.collection().to_string(),
                    field: head.to_string(),
                })
            }
        };
        self.fieldset.insert(field.name.clone());

        let position = match self
            .included_fields
            .iter()
            .position(|inc| inc.field.name == field.name)
        {
            Some(position) => position,
            None => {
                let model = registry
                    .get(&related)
                    .ok_or_else(|| ScopeError::ModelNotFound(related.clone()))?;
                self.included_fields.push(IncludeField {
                    field,
                    scope: Scope::new_included(model),
                });
                self.included_fields.len() - 1
            }
        };

        if let Some(rest) = rest {
            self.included_fields[position]
                .scope
                .include(registry, rest)?;
        }
        Ok(())
    }

    /// Finds this scope or an included scope of the given collection.
    pub fn scope_for_collection_mut(&mut self, collection: &str) -> Option<&mut Scope> {
        if self.collection() == collection {
            return Some(self);
        }
        self.included_fields
            .iter_mut()
            .find_map(|inc| inc.scope.scope_for_collection_mut(collection))
    }

    /// Advances the include cursor. Returns false once every included field was visited.
    pub fn next_included_field(&mut self) -> bool {
        let next = self.include_cursor.map_or(0, |i| i + 1);
        if next < self.included_fields.len() {
            self.include_cursor = Some(next);
            true
        } else {
            self.include_cursor = None;
            false
        }
    }

    pub fn current_included_index(&self) -> Result<usize, ScopeError> {
        self.include_cursor
            .ok_or_else(|| ScopeError::NoIncludedField(self.collection().to_string()))
    }

    pub fn reset_included_cursor(&mut self) {
        self.include_cursor = None;
    }

    /// Related keys referenced by the value under the included field at `index`
    /// and not yet materialized. Keys are deduplicated; related resources that
    /// arrived embedded with attributes are skipped.
    pub fn missing_primaries(&self, index: usize) -> Result<Vec<Value>, ScopeError> {
        let included = self
            .included_fields
            .get(index)
            .ok_or_else(|| ScopeError::NoIncludedField(self.collection().to_string()))?;

        let missing = self
            .resources()
            .into_iter()
            .flat_map(|r| r.related(&included.field))
            .filter(|related| related.has_id() && related.attributes.is_empty())
            .map(|related| related.id.clone())
            .unique_by(key_of)
            .collect();
        Ok(missing)
    }

    /// True when no filter of any kind is set.
    pub fn has_no_filters(&self) -> bool {
        self.primary_filters.is_empty()
            && self.attribute_filters.is_empty()
            && self.relationship_filters.is_empty()
            && self.language_filter.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueType;

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                ModelStruct::new("blogs", StructField::primary("id", ValueType::Integer))
                    .with_field(StructField::attribute("title", ValueType::String))
                    .with_field(StructField::attribute("lang", ValueType::String).langtag())
                    .with_field(StructField::to_one("post", "posts")),
            )
            .unwrap();
        registry
            .register(
                ModelStruct::new("posts", StructField::primary("id", ValueType::Integer))
                    .with_field(StructField::attribute("title", ValueType::String))
                    .with_field(StructField::to_many("comments", "comments")),
            )
            .unwrap();
        registry
            .register(
                ModelStruct::new("comments", StructField::primary("id", ValueType::Integer))
                    .with_field(StructField::to_one("post", "posts").hidden()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_value_kind_mismatch_is_an_error() {
        let registry = registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        assert!(matches!(scope.value_single(), Err(ScopeError::NoValue(_))));

        scope.new_value_many();
        assert!(matches!(
            scope.value_single(),
            Err(ScopeError::ValueKind { .. })
        ));
        assert!(scope.value_many_mut().is_ok());
    }

    #[test]
    fn test_include_builds_nested_tree() {
        let registry = registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.include(&registry, "post.comments").unwrap();
        scope.include(&registry, "post").unwrap();

        assert_eq!(scope.included_fields.len(), 1);
        let post = &scope.included_fields[0].scope;
        assert_eq!(post.collection(), "posts");
        assert!(!post.is_root());
        assert_eq!(post.included_fields[0].scope.collection(), "comments");

        assert!(matches!(
            scope.include(&registry, "title"),
            Err(ScopeError::NotRelationship { .. })
        ));
    }

    #[test]
    fn test_hidden_relationship_cannot_be_included() {
        let registry = registry();
        let mut scope = Scope::new(registry.get("comments").unwrap());
        assert!(matches!(
            scope.include(&registry, "post"),
            Err(ScopeError::HiddenField { .. })
        ));
        assert!(scope.included_fields.is_empty());
        assert!(!scope.fieldset.contains("post"));
    }

    #[test]
    fn test_missing_primaries_are_deduplicated() {
        let registry = registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.include(&registry, "post").unwrap();
        scope.value = ScopeValue::Many(vec![
            Resource::new(1).with_to_one("post", 7),
            Resource::new(2).with_to_one("post", 7),
            Resource::new(3).with_to_one("post", 8),
        ]);

        let missing = scope.missing_primaries(0).unwrap();
        assert_eq!(missing, vec![Value::from(7), Value::from(8)]);
    }

    #[test]
    fn test_include_cursor_walks_every_field_once() {
        let registry = registry();
        let mut scope = Scope::new(registry.get("posts").unwrap());
        scope.include(&registry, "comments").unwrap();

        assert!(scope.next_included_field());
        assert_eq!(scope.current_included_index().unwrap(), 0);
        assert!(!scope.next_included_field());
        assert!(scope.current_included_index().is_err());
    }

    #[test]
    fn test_language_filter_requires_langtag_field() {
        let registry = registry();
        let mut blogs = Scope::new(registry.get("blogs").unwrap());
        blogs.set_language_filter(vec!["en".to_string()]).unwrap();
        assert!(blogs.language_filter.is_some());

        let mut posts = Scope::new(registry.get("posts").unwrap());
        assert!(matches!(
            posts.set_language_filter(vec!["en".to_string()]),
            Err(ScopeError::NoLanguageField(_))
        ));
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{FieldKind, StructField};

/// One resource instance. Relationships hold related resources, which are bare
/// identifiers unless the repository embedded their attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    pub id: Value,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    ToOne(Option<Box<Resource>>),
    ToMany(Vec<Resource>),
}

impl Relationship {
    pub fn resources(&self) -> Vec<&Resource> {
        match self {
            Relationship::ToOne(Some(related)) => vec![related.as_ref()],
            Relationship::ToOne(None) => Vec::new(),
            Relationship::ToMany(related) => related.iter().collect(),
        }
    }

    pub fn ids(&self) -> Vec<Value> {
        self.resources()
            .into_iter()
            .filter(|r| r.has_id())
            .map(|r| r.id.clone())
            .collect()
    }
}

impl Resource {
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_to_one(mut self, name: &str, id: impl Into<Value>) -> Self {
        self.relationships.insert(
            name.to_string(),
            Relationship::ToOne(Some(Box::new(Resource::new(id)))),
        );
        self
    }

    pub fn with_to_many<V: Into<Value>>(
        mut self,
        name: &str,
        ids: impl IntoIterator<Item = V>,
    ) -> Self {
        let related = ids.into_iter().map(Resource::new).collect();
        self.relationships
            .insert(name.to_string(), Relationship::ToMany(related));
        self
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_null()
    }

    pub fn identifier(&self) -> Resource {
        Resource::new(self.id.clone())
    }

    pub fn is_set(&self, field: &StructField) -> bool {
        match field.kind {
            FieldKind::Primary => self.has_id(),
            FieldKind::Attribute => self.attributes.contains_key(&field.name),
            _ => self.relationships.contains_key(&field.name),
        }
    }

    /// Values stored under `field`. Relationships yield the related keys.
    pub fn field_values(&self, field: &StructField) -> Vec<Value> {
        match field.kind {
            FieldKind::Primary if self.has_id() => vec![self.id.clone()],
            FieldKind::Primary => Vec::new(),
            FieldKind::Attribute => match self.attributes.get(&field.name) {
                Some(Value::Null) | None => Vec::new(),
                Some(value) => vec![value.clone()],
            },
            _ => self
                .relationships
                .get(&field.name)
                .map(|r| r.ids())
                .unwrap_or_default(),
        }
    }

    pub fn related(&self, field: &StructField) -> Vec<&Resource> {
        self.relationships
            .get(&field.name)
            .map(|r| r.resources())
            .unwrap_or_default()
    }

    pub fn set_value(&mut self, field: &StructField, value: Value) {
        match field.kind {
            FieldKind::Primary => self.id = value,
            FieldKind::Attribute => {
                self.attributes.insert(field.name.clone(), value);
            }
            FieldKind::RelationshipSingle => {
                let related = (!value.is_null()).then(|| Box::new(Resource::new(value)));
                self.relationships
                    .insert(field.name.clone(), Relationship::ToOne(related));
            }
            FieldKind::RelationshipMultiple => {
                self.relationships.insert(
                    field.name.clone(),
                    Relationship::ToMany(vec![Resource::new(value)]),
                );
            }
        }
    }

    /// Appends related identifiers to a to-many relationship.
    pub fn append_related(&mut self, field: &StructField, ids: Vec<Value>) {
        let entry = self
            .relationships
            .entry(field.name.clone())
            .or_insert_with(|| Relationship::ToMany(Vec::new()));
        match entry {
            Relationship::ToMany(related) => related.extend(ids.into_iter().map(Resource::new)),
            Relationship::ToOne(_) => {
                *entry = Relationship::ToMany(ids.into_iter().map(Resource::new).collect());
            }
        }
    }

    /// Drops every attribute and relationship not named in `fieldset`.
    pub fn project(&mut self, fieldset: &BTreeSet<String>) {
        self.attributes.retain(|name, _| fieldset.contains(name));
        self.relationships.retain(|name, _| fieldset.contains(name));
    }
}

/// Canonical string form of a key, used for deduplication and lookups.
pub fn key_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueType;

    #[test]
    fn test_field_values_by_kind() {
        let blog = Resource::new(1)
            .with_attribute("title", "first")
            .with_to_one("post", 5)
            .with_to_many("authors", vec![1, 2]);

        let primary = StructField::primary("id", ValueType::Integer);
        let title = StructField::attribute("title", ValueType::String);
        let post = StructField::to_one("post", "posts");
        let authors = StructField::to_many("authors", "authors");

        assert_eq!(blog.field_values(&primary), vec![Value::from(1)]);
        assert_eq!(blog.field_values(&title), vec![Value::from("first")]);
        assert_eq!(blog.field_values(&post), vec![Value::from(5)]);
        assert_eq!(
            blog.field_values(&authors),
            vec![Value::from(1), Value::from(2)]
        );
    }

    #[test]
    fn test_project_keeps_only_fieldset() {
        let mut blog = Resource::new(1)
            .with_attribute("title", "first")
            .with_attribute("lang", "en")
            .with_to_one("post", 5);
        let fieldset: BTreeSet<String> = ["title".to_string()].into_iter().collect();
        blog.project(&fieldset);

        assert_eq!(blog.attributes.len(), 1);
        assert!(blog.relationships.is_empty());
        assert_eq!(blog.id, Value::from(1));
    }

    #[test]
    fn test_key_of_is_stable_for_strings_and_numbers() {
        assert_eq!(key_of(&Value::from("abc")), "abc");
        assert_eq!(key_of(&Value::from(3)), "3");
    }
}

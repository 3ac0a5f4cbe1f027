use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::model::{HookFn, HookKind, Hooks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Primary,
    Attribute,
    RelationshipSingle,
    RelationshipMultiple,
}

impl FieldKind {
    pub fn is_relationship(&self) -> bool {
        matches!(
            self,
            FieldKind::RelationshipSingle | FieldKind::RelationshipMultiple
        )
    }
}

/// Scalar type of a primary key or attribute, used to coerce path and query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Any,
}

impl ValueType {
    pub fn parse(&self, raw: &str) -> Option<Value> {
        match self {
            ValueType::String => Some(Value::String(raw.to_string())),
            ValueType::Integer => raw.parse::<i64>().ok().map(Value::from),
            ValueType::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            ValueType::Boolean => match raw {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueType::Any => Some(
                raw.parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(raw.to_string())),
            ),
        }
    }
}

/// Declarative value constraint checked on create or patch bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Required,
    /// The caller may not provide the field.
    Empty,
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
}

/// One field of a resource type. `index` is the position in the type's accessor table:
/// 0 is the primary key, attributes and relationships follow in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub index: usize,
    pub kind: FieldKind,
    pub value_type: ValueType,
    /// Related collection for relationship fields.
    pub related: Option<String>,
    pub hidden: bool,
    pub langtag: bool,
    pub on_create: Vec<Constraint>,
    pub on_patch: Vec<Constraint>,
}

impl StructField {
    fn new(name: &str, kind: FieldKind, value_type: ValueType, related: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            index: 0,
            kind,
            value_type,
            related,
            hidden: false,
            langtag: false,
            on_create: Vec::new(),
            on_patch: Vec::new(),
        }
    }

    pub fn primary(name: &str, value_type: ValueType) -> Self {
        Self::new(name, FieldKind::Primary, value_type, None)
    }

    pub fn attribute(name: &str, value_type: ValueType) -> Self {
        Self::new(name, FieldKind::Attribute, value_type, None)
    }

    pub fn to_one(name: &str, related: &str) -> Self {
        Self::new(
            name,
            FieldKind::RelationshipSingle,
            ValueType::Any,
            Some(related.to_string()),
        )
    }

    pub fn to_many(name: &str, related: &str) -> Self {
        Self::new(
            name,
            FieldKind::RelationshipMultiple,
            ValueType::Any,
            Some(related.to_string()),
        )
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Marks the attribute holding the resource's language tag.
    pub fn langtag(mut self) -> Self {
        self.langtag = true;
        self
    }

    pub fn on_create(mut self, constraint: Constraint) -> Self {
        self.on_create.push(constraint);
        self
    }

    pub fn on_patch(mut self, constraint: Constraint) -> Self {
        self.on_patch.push(constraint);
        self
    }

    pub fn is_relationship(&self) -> bool {
        self.kind.is_relationship()
    }
}

/// Model descriptor of one resource type.
#[derive(Debug, Clone)]
pub struct ModelStruct {
    collection: String,
    primary: StructField,
    fields: Vec<StructField>,
    hooks: Hooks,
}

impl ModelStruct {
    pub fn new(collection: &str, mut primary: StructField) -> Self {
        primary.kind = FieldKind::Primary;
        primary.index = 0;
        Self {
            collection: collection.to_string(),
            primary,
            fields: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    pub fn with_field(mut self, mut field: StructField) -> Self {
        field.index = self.fields.len() + 1;
        self.fields.push(field);
        self
    }

    pub fn with_hook(mut self, kind: HookKind, hook: HookFn) -> Self {
        self.hooks.insert(kind, hook);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn primary(&self) -> &StructField {
        &self.primary
    }

    /// Attributes and relationships in declaration order.
    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        if self.primary.name == name {
            return Some(&self.primary);
        }
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_index(&self, index: usize) -> Option<&StructField> {
        match index {
            0 => Some(&self.primary),
            i => self.fields.get(i - 1),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &StructField> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Attribute)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &StructField> {
        self.fields.iter().filter(|f| f.is_relationship())
    }

    pub fn language_field(&self) -> Option<&StructField> {
        self.fields.iter().find(|f| f.langtag)
    }

    pub fn use_i18n(&self) -> bool {
        self.language_field().is_some()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("collection '{0}' is already registered")]
    DuplicateCollection(String),
    #[error("collection '{collection}' declares field '{field}' twice")]
    DuplicateField { collection: String, field: String },
    #[error("relationship '{collection}.{field}' points at unregistered collection '{related}'")]
    UnknownRelated {
        collection: String,
        field: String,
        related: String,
    },
}

/// All model descriptors known to the engine. Populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelStruct>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: ModelStruct) -> Result<(), SchemaError> {
        if self.models.contains_key(model.collection()) {
            return Err(SchemaError::DuplicateCollection(
                model.collection().to_string(),
            ));
        }

        let mut seen = HashSet::new();
        seen.insert(model.primary().name.clone());
        for field in model.fields() {
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    collection: model.collection().to_string(),
                    field: field.name.clone(),
                });
            }
        }

        self.models
            .insert(model.collection().to_string(), Arc::new(model));
        Ok(())
    }

    /// Checks that every relationship points at a registered collection.
    pub fn verify(&self) -> Result<(), SchemaError> {
        for model in self.models.values() {
            for rel in model.relationships() {
                let related = rel.related.clone().unwrap_or_default();
                if !self.models.contains_key(&related) {
                    return Err(SchemaError::UnknownRelated {
                        collection: model.collection().to_string(),
                        field: rel.name.clone(),
                        related,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, collection: &str) -> Option<Arc<ModelStruct>> {
        self.models.get(collection).cloned()
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|k| k.as_str())
    }
}

use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::error::{ApiError, ErrorKind, ErrorResponse};
use crate::model::{
    key_of, FieldKind, ModelRegistry, ModelStruct, Relationship, Resource, Scope, ScopeValue,
    StructField, ValueType,
};

pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Top level document for a scope: `data`, the deduplicated `included`
/// resources and a `total` meta when the list was counted.
pub fn marshal_scope(scope: &Scope, identifiers_only: bool) -> Value {
    let collection = scope.collection();
    let resource_object = |r: &Resource| {
        if identifiers_only {
            identifier_object(collection, &r.id)
        } else {
            marshal_resource(scope.model(), r)
        }
    };
    let data = match &scope.value {
        ScopeValue::Empty => Value::Null,
        ScopeValue::Single(resource) => resource_object(resource),
        ScopeValue::Many(resources) => {
            Value::Array(resources.iter().map(resource_object).collect())
        }
    };

    let mut document = Map::new();
    document.insert("data".to_string(), data);

    if !identifiers_only {
        let mut seen = HashSet::new();
        let mut included = Vec::new();
        collect_included(scope, &mut seen, &mut included);
        if !included.is_empty() {
            document.insert("included".to_string(), Value::Array(included));
        }
    }
    if let Some(total) = scope.total {
        document.insert("meta".to_string(), json!({ "total": total }));
    }
    Value::Object(document)
}

fn collect_included(scope: &Scope, seen: &mut HashSet<(String, String)>, out: &mut Vec<Value>) {
    for included in &scope.included_fields {
        let nested = &included.scope;
        for resource in nested.resources() {
            if seen.insert((nested.collection().to_string(), key_of(&resource.id))) {
                out.push(marshal_resource(nested.model(), resource));
            }
        }
        collect_included(nested, seen, out);
    }
}

fn identifier_object(collection: &str, id: &Value) -> Value {
    json!({ "type": collection, "id": key_of(id) })
}

pub fn marshal_resource(model: &ModelStruct, resource: &Resource) -> Value {
    let mut object = Map::new();
    object.insert("type".to_string(), Value::from(model.collection()));
    object.insert("id".to_string(), Value::from(key_of(&resource.id)));

    if !resource.attributes.is_empty() {
        let attributes: Map<String, Value> = resource
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        object.insert("attributes".to_string(), Value::Object(attributes));
    }

    let relationships: Map<String, Value> = resource
        .relationships
        .iter()
        .filter_map(|(name, relationship)| {
            let related = model.field(name)?.related.as_deref()?;
            let data = match relationship {
                Relationship::ToOne(None) => Value::Null,
                Relationship::ToOne(Some(r)) => identifier_object(related, &r.id),
                Relationship::ToMany(rs) => {
                    Value::Array(rs.iter().map(|r| identifier_object(related, &r.id)).collect())
                }
            };
            Some((name.clone(), json!({ "data": data })))
        })
        .collect();
    if !relationships.is_empty() {
        object.insert("relationships".to_string(), Value::Object(relationships));
    }
    Value::Object(object)
}

pub fn error_document(response: &ErrorResponse) -> Value {
    json!({ "errors": response.errors.iter().map(ApiError::to_object).collect::<Vec<_>>() })
}

fn invalid_input(detail: impl Into<String>) -> ApiError {
    ApiError::with_detail(ErrorKind::InvalidInput, detail)
}

fn invalid_field(field: &str) -> ApiError {
    ApiError::with_detail(
        ErrorKind::InvalidJsonFieldValue,
        format!("Invalid value for the field: '{}'.", field),
    )
}

/// Reads the resource object of a request body for `model`.
pub fn unmarshal_resource(
    registry: &ModelRegistry,
    model: &ModelStruct,
    body: &[u8],
) -> Result<Resource, ApiError> {
    let document: Value =
        serde_json::from_slice(body)
            .map_err(|e| invalid_input(format!("Invalid JSON document: {}", e)))?;
    let data = document
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid_input("The document has no resource object under 'data'."))?;

    match data.get("type").and_then(Value::as_str) {
        Some(kind) if kind == model.collection() => {}
        Some(kind) => {
            return Err(ApiError::with_detail(
                ErrorKind::InvalidResourceName,
                format!("Resource type '{}' does not match '{}'.", kind, model.collection()),
            ))
        }
        None => return Err(invalid_input("The resource object has no 'type'.")),
    }

    let mut resource = Resource::default();
    if let Some(id) = data.get("id") {
        resource.id = parse_key(model.primary(), id)?;
    }

    if let Some(attributes) = data.get("attributes") {
        let attributes = attributes
            .as_object()
            .ok_or_else(|| invalid_input("'attributes' must be an object."))?;
        for (name, value) in attributes {
            let field = model
                .field(name)
                .filter(|f| f.kind == FieldKind::Attribute)
                .ok_or_else(|| invalid_field(name))?;
            if !type_matches(field.value_type, value) {
                return Err(invalid_field(name));
            }
            resource.attributes.insert(name.clone(), value.clone());
        }
    }

    if let Some(relationships) = data.get("relationships") {
        let relationships = relationships
            .as_object()
            .ok_or_else(|| invalid_input("'relationships' must be an object."))?;
        for (name, value) in relationships {
            let field = model
                .field(name)
                .filter(|f| f.is_relationship())
                .ok_or_else(|| invalid_field(name))?;
            let related = field
                .related
                .as_deref()
                .and_then(|r| registry.get(r))
                .ok_or_else(|| invalid_field(name))?;
            let data = value.get("data").ok_or_else(|| invalid_field(name))?;
            let relationship = match (field.kind, data) {
                (FieldKind::RelationshipSingle, Value::Null) => Relationship::ToOne(None),
                (FieldKind::RelationshipSingle, Value::Object(_)) => {
                    Relationship::ToOne(Some(Box::new(parse_identifier(&related, field, data)?)))
                }
                (FieldKind::RelationshipMultiple, Value::Array(items)) => Relationship::ToMany(
                    items
                        .iter()
                        .map(|item| parse_identifier(&related, field, item))
                        .collect::<Result<_, _>>()?,
                ),
                _ => return Err(invalid_field(name)),
            };
            resource.relationships.insert(name.clone(), relationship);
        }
    }
    Ok(resource)
}

fn parse_identifier(
    related: &ModelStruct,
    field: &StructField,
    data: &Value,
) -> Result<Resource, ApiError> {
    if data.get("type").and_then(Value::as_str) != Some(related.collection()) {
        return Err(invalid_field(&field.name));
    }
    let id = data.get("id").ok_or_else(|| invalid_field(&field.name))?;
    Ok(Resource::new(parse_key(related.primary(), id)?))
}

/// Coerces a key given as string or number to the primary field's type.
pub fn parse_key(primary: &StructField, raw: &Value) -> Result<Value, ApiError> {
    let parsed = match raw {
        Value::String(s) => primary.value_type.parse(s),
        Value::Number(_) if type_matches(primary.value_type, raw) => Some(raw.clone()),
        _ => None,
    };
    parsed.ok_or_else(|| invalid_field(&primary.name))
}

fn type_matches(value_type: ValueType, value: &Value) -> bool {
    match (value_type, value) {
        (_, Value::Null) | (ValueType::Any, _) => true,
        (ValueType::String, Value::String(_)) => true,
        (ValueType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ValueType::Float, Value::Number(_)) => true,
        (ValueType::Boolean, Value::Bool(_)) => true,
        _ => false,
    }
}

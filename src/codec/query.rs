use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use url::form_urlencoded;

use crate::error::{ApiError, ErrorKind};
use crate::model::{
    FieldKind, FilterField, ModelRegistry, ModelStruct, Operator, Pagination, PresetPair, Scope,
    ScopeError, SortField, SortOrder, StructField,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid query parameter '{0}'")]
    InvalidParameter(String),
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("collection '{collection}' has no field '{field}'")]
    UnknownField { collection: String, field: String },
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },
    #[error("unsupported filter: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let kind = match err {
            QueryError::UnknownOperator(_) | QueryError::Unsupported(_) => {
                ErrorKind::UnsupportedFilter
            }
            _ => ErrorKind::InvalidQueryParameter,
        };
        ApiError::with_detail(kind, err.to_string())
    }
}

/// Root scope for `model` built from a raw query string.
pub fn build_scope(
    registry: &ModelRegistry,
    model: Arc<ModelStruct>,
    query: &str,
) -> Result<Scope, QueryError> {
    let mut scope = Scope::new(model);
    apply_query(registry, &mut scope, query)?;
    Ok(scope)
}

/// Source scope of a preset or precheck rule, written as `collection` or
/// `collection?query`. Only keys are selected.
pub fn preset_scope(registry: &ModelRegistry, source: &str) -> Result<Scope, QueryError> {
    let (collection, query) = source.split_once('?').unwrap_or((source, ""));
    let model = registry
        .get(collection)
        .ok_or_else(|| QueryError::UnknownCollection(collection.to_string()))?;
    let mut scope = Scope::new_keys_only(model);
    apply_query(registry, &mut scope, query)?;
    Ok(scope)
}

/// Empty filter on `path` of `collection`, with `path` naming a field or a
/// relationship and one of its related fields (`post.id`).
pub fn filter_field(
    registry: &ModelRegistry,
    collection: &str,
    path: &str,
    operator: Operator,
) -> Result<FilterField, QueryError> {
    let model = registry
        .get(collection)
        .ok_or_else(|| QueryError::UnknownCollection(collection.to_string()))?;
    let (head, sub) = match path.split_once('.') {
        Some((head, sub)) => (head, Some(sub)),
        None => (path, None),
    };
    let field = model_field(&model, head)?;

    match (field.is_relationship(), sub) {
        (true, Some(sub)) => {
            let related = related_model(registry, &field)?;
            let sub_field = model_field(&related, sub)?;
            let sub = FilterField::new(sub_field).with_values(operator, Vec::new());
            Ok(FilterField::new(field).with_relationship(sub))
        }
        (false, None) => Ok(FilterField::new(field).with_values(operator, Vec::new())),
        _ => Err(QueryError::Unsupported(format!(
            "'{}' is not a valid filter path on '{}'",
            path, collection
        ))),
    }
}

/// Rule reading keys from `source` into the `target` filter of `collection`.
pub fn preset_pair(
    registry: &ModelRegistry,
    source: &str,
    collection: &str,
    target: &str,
    operator: Operator,
) -> Result<PresetPair, QueryError> {
    Ok(PresetPair::new(
        preset_scope(registry, source)?,
        filter_field(registry, collection, target, operator)?,
    ))
}

fn apply_query(registry: &ModelRegistry, scope: &mut Scope, query: &str) -> Result<(), QueryError> {
    let params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Includes first, so field sets and filters can address included collections.
    for (_, value) in params.iter().filter(|(key, _)| key == "include") {
        for path in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            scope.include(registry, path)?;
        }
    }

    for (key, value) in &params {
        match key.as_str() {
            "include" => {}
            "sort" => parse_sort(scope, value)?,
            "page[limit]" => page(scope).limit = Some(parse_usize(key, value)?),
            "page[offset]" => page(scope).offset = Some(parse_usize(key, value)?),
            _ if key.starts_with("fields[") => parse_fieldset(scope, key, value)?,
            _ if key.starts_with("filter[") => parse_filter(registry, scope, key, value)?,
            _ => return Err(QueryError::InvalidParameter(key.clone())),
        }
    }
    Ok(())
}

fn page(scope: &mut Scope) -> &mut Pagination {
    scope.pagination.get_or_insert_with(Pagination::default)
}

fn parse_usize(key: &str, value: &str) -> Result<usize, QueryError> {
    value.parse().map_err(|_| QueryError::InvalidValue {
        field: key.to_string(),
        value: value.to_string(),
    })
}

/// Splits `name[a][b][c]` into `["a", "b", "c"]`.
fn bracket_segments(key: &str) -> Option<Vec<&str>> {
    let start = key.find('[')?;
    let mut rest = &key[start..];
    let mut segments = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let end = inner.find(']')?;
        segments.push(&inner[..end]);
        rest = &inner[end + 1..];
    }
    Some(segments)
}

fn model_field(model: &ModelStruct, name: &str) -> Result<StructField, QueryError> {
    if model.primary().name == name {
        return Ok(model.primary().clone());
    }
    model
        .field(name)
        .cloned()
        .ok_or_else(|| QueryError::UnknownField {
            collection: model.collection().to_string(),
            field: name.to_string(),
        })
}

/// Field a client may address. Hidden fields are reported as unknown.
fn visible_field(model: &ModelStruct, name: &str) -> Result<StructField, QueryError> {
    match model_field(model, name)? {
        field if field.hidden => Err(QueryError::UnknownField {
            collection: model.collection().to_string(),
            field: name.to_string(),
        }),
        field => Ok(field),
    }
}

fn related_model(
    registry: &ModelRegistry,
    field: &StructField,
) -> Result<Arc<ModelStruct>, QueryError> {
    let related = field.related.as_deref().unwrap_or_default();
    registry
        .get(related)
        .ok_or_else(|| QueryError::UnknownCollection(related.to_string()))
}

fn parse_sort(scope: &mut Scope, value: &str) -> Result<(), QueryError> {
    for raw in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, order) = match raw.strip_prefix('-') {
            Some(name) => (name, SortOrder::Descending),
            None => (raw, SortOrder::Ascending),
        };
        let field = visible_field(scope.model(), name)?;
        if field.is_relationship() {
            return Err(QueryError::Unsupported(format!("cannot sort by relationship '{}'", name)));
        }
        scope.sorts.push(SortField { field, order });
    }
    Ok(())
}

fn parse_fieldset(scope: &mut Scope, key: &str, value: &str) -> Result<(), QueryError> {
    let collection = match bracket_segments(key).as_deref() {
        Some([collection]) => collection.to_string(),
        _ => return Err(QueryError::InvalidParameter(key.to_string())),
    };
    let target = scope
        .scope_for_collection_mut(&collection)
        .ok_or_else(|| QueryError::UnknownCollection(collection.clone()))?;

    let mut fieldset = BTreeSet::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match target.model().field(name) {
            Some(field) if !field.hidden => {
                fieldset.insert(field.name.clone());
            }
            _ => {
                return Err(QueryError::UnknownField {
                    collection: collection.clone(),
                    field: name.to_string(),
                })
            }
        }
    }
    // Included relationships stay selected so their keys can be followed.
    for included in &target.included_fields {
        fieldset.insert(included.field.name.clone());
    }
    target.fieldset = fieldset;
    Ok(())
}

fn parse_values(field: &StructField, raw: &str) -> Result<Vec<Value>, QueryError> {
    raw.split(',')
        .map(|item| {
            field.value_type.parse(item).ok_or_else(|| QueryError::InvalidValue {
                field: field.name.clone(),
                value: item.to_string(),
            })
        })
        .collect()
}

fn parse_operator(raw: Option<&str>, values: &[Value]) -> Result<Operator, QueryError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| QueryError::UnknownOperator(raw.to_string())),
        None if values.len() > 1 => Ok(Operator::In),
        None => Ok(Operator::Equal),
    }
}

fn parse_filter(
    registry: &ModelRegistry,
    scope: &mut Scope,
    key: &str,
    value: &str,
) -> Result<(), QueryError> {
    let segments =
        bracket_segments(key).ok_or_else(|| QueryError::InvalidParameter(key.to_string()))?;
    let (collection, name, rest) = match segments.as_slice() {
        [collection, name, rest @ ..] => (*collection, *name, rest),
        _ => return Err(QueryError::InvalidParameter(key.to_string())),
    };

    let is_root = scope.collection() == collection;
    let target = scope
        .scope_for_collection_mut(collection)
        .ok_or_else(|| QueryError::UnknownCollection(collection.to_string()))?;
    let field = visible_field(target.model(), name)?;

    let filter = if field.is_relationship() {
        if !is_root {
            return Err(QueryError::Unsupported(format!(
                "relationship filter '{}' on included collection '{}'",
                name, collection
            )));
        }
        let (sub_name, operator) = match rest {
            [sub] => (*sub, None),
            [sub, operator] => (*sub, Some(*operator)),
            _ => return Err(QueryError::InvalidParameter(key.to_string())),
        };
        let related = related_model(registry, &field)?;
        let sub_field = visible_field(&related, sub_name)?;
        if sub_field.kind != FieldKind::Primary && sub_field.kind != FieldKind::Attribute {
            return Err(QueryError::Unsupported(format!(
                "nested relationship filter '{}.{}'",
                name, sub_name
            )));
        }
        let values = parse_values(&sub_field, value)?;
        let operator = parse_operator(operator, &values)?;
        let sub = FilterField::new(sub_field).with_values(operator, values);
        FilterField::new(field).with_relationship(sub)
    } else {
        let operator = match rest {
            [] => None,
            [operator] => Some(*operator),
            _ => return Err(QueryError::InvalidParameter(key.to_string())),
        };
        let values = parse_values(&field, value)?;
        let operator = parse_operator(operator, &values)?;
        FilterField::new(field).with_values(operator, values)
    };

    target.add_filter_field(filter);
    Ok(())
}

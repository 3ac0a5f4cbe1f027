use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{StorageError, StorageErrorKind};
use crate::model::{
    key_of, FieldKind, FilterField, FilterValues, Operator, Resource, Scope, SortField, SortOrder,
};

/// Evaluates scope filters against stored resources.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// True when the resource passes every filter of the scope.
    pub fn matches(resource: &Resource, scope: &Scope) -> Result<bool, StorageError> {
        let filters = scope
            .primary_filters
            .iter()
            .chain(scope.attribute_filters.iter())
            .chain(scope.language_filter.iter())
            .chain(scope.relationship_filters.iter());

        for filter in filters {
            if !Self::evaluate_filter(resource, filter)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn evaluate_filter(
        resource: &Resource,
        filter: &FilterField,
    ) -> Result<bool, StorageError> {
        if filter.kind().is_relationship() {
            return Self::evaluate_relationship(resource, filter);
        }

        let actual = resource.field_values(&filter.field);
        for values in &filter.values {
            if !Self::evaluate_values(&actual, values)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // Only key sub-filters can be answered without reading the related collection.
    fn evaluate_relationship(
        resource: &Resource,
        filter: &FilterField,
    ) -> Result<bool, StorageError> {
        let related_ids = resource
            .relationships
            .get(filter.name())
            .map(|r| r.ids())
            .unwrap_or_default();

        for sub in &filter.relationships {
            if sub.kind() != FieldKind::Primary {
                return Err(StorageError::new(
                    StorageErrorKind::Unspecified,
                    format!(
                        "relationship filter '{}.{}' was not resolved to related keys",
                        filter.name(),
                        sub.name()
                    ),
                ));
            }
            for values in &sub.values {
                if !Self::evaluate_values(&related_ids, values)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Applies one operator to the values a field holds. Several field values
    /// (to-many relationships) match when any of them does; negated operators
    /// require that none of them is listed.
    fn evaluate_values(actual: &[Value], filter: &FilterValues) -> Result<bool, StorageError> {
        let listed = |v: &Value| filter.values.iter().any(|expected| values_equal(v, expected));

        let result = match filter.operator {
            Operator::Equal | Operator::In => actual.iter().any(listed),
            Operator::NotEqual | Operator::NotIn => !actual.iter().any(listed),
            Operator::LessThan
            | Operator::LessEqual
            | Operator::GreaterThan
            | Operator::GreaterEqual => {
                let expected = filter.values.first().ok_or_else(|| {
                    StorageError::new(
                        StorageErrorKind::InvalidSyntax,
                        format!("operator '{}' needs a value", filter.operator),
                    )
                })?;
                actual.iter().any(|v| {
                    compare_values(v, expected)
                        .map(|ord| match filter.operator {
                            Operator::LessThan => ord == Ordering::Less,
                            Operator::LessEqual => ord != Ordering::Greater,
                            Operator::GreaterThan => ord == Ordering::Greater,
                            _ => ord != Ordering::Less,
                        })
                        .unwrap_or(false)
                })
            }
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                actual.iter().any(|v| {
                    let Some(haystack) = v.as_str() else {
                        return false;
                    };
                    filter.values.iter().filter_map(Value::as_str).any(|needle| {
                        match filter.operator {
                            Operator::Contains => haystack.contains(needle),
                            Operator::StartsWith => haystack.starts_with(needle),
                            _ => haystack.ends_with(needle),
                        }
                    })
                })
            }
        };
        Ok(result)
    }

    /// Orders resources by the given sort fields, first field first.
    pub fn sort(resources: &mut [Resource], sorts: &[SortField]) {
        resources.sort_by(|a, b| {
            for sort in sorts {
                let left = a.field_values(&sort.field);
                let right = b.field_values(&sort.field);
                let ord = match (left.first(), right.first()) {
                    (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                let ord = match sort.order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

/// Equality that tolerates a number compared with its string form.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    left == right || key_of(left) == key_of(right)
}

/// Orders two scalars. Numbers and numeric strings compare numerically,
/// strings lexicographically; anything else is unordered.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => match (l.parse::<f64>(), r.parse::<f64>()) {
            (Ok(lf), Ok(rf)) => lf.partial_cmp(&rf),
            _ => Some(l.cmp(r)),
        },
        (Value::Number(l), Value::String(r)) => l.as_f64()?.partial_cmp(&r.parse::<f64>().ok()?),
        (Value::String(l), Value::Number(r)) => l.parse::<f64>().ok()?.partial_cmp(&r.as_f64()?),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

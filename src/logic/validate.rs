use serde_json::Value;

use crate::error::{ApiError, ErrorKind};
use crate::model::{Constraint, ModelStruct, Resource, StructField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Patch,
}

/// Checks a request body against the model's declared constraints and
/// returns every violation found.
pub fn validate_resource(
    model: &ModelStruct,
    resource: &Resource,
    mode: ValidationMode,
) -> Vec<ApiError> {
    std::iter::once(model.primary())
        .chain(model.fields().iter())
        .flat_map(|field| {
            let constraints = match mode {
                ValidationMode::Create => &field.on_create,
                ValidationMode::Patch => &field.on_patch,
            };
            constraints
                .iter()
                .filter_map(move |c| check_constraint(field, resource, c))
        })
        .collect()
}

fn check_constraint(
    field: &StructField,
    resource: &Resource,
    constraint: &Constraint,
) -> Option<ApiError> {
    let values = resource.field_values(field);
    match constraint {
        Constraint::Required => {
            let missing = values.is_empty() || values.iter().all(is_blank);
            missing.then(|| {
                ApiError::with_detail(
                    ErrorKind::MissingRequiredJsonField,
                    format!("The field: {}, is required.", field.name),
                )
            })
        }
        Constraint::Empty => (resource.is_set(field) && !values.iter().all(is_blank)).then(|| {
            ApiError::with_detail(
                ErrorKind::InvalidJsonFieldValue,
                format!("The field: '{}' must be empty.", field.name),
            )
        }),
        Constraint::Length { min, max } => {
            let length = match values.first() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(items)) => items.len(),
                _ if field.is_relationship() => values.len(),
                _ => return None,
            };
            let too_short = min.is_some_and(|min| length < min);
            let too_long = max.is_some_and(|max| length > max);
            (too_short || too_long).then(|| {
                ApiError::with_detail(
                    ErrorKind::InvalidJsonFieldValue,
                    format!("The value of the field: {} is of invalid length.", field.name),
                )
            })
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueType;

    fn posts() -> ModelStruct {
        ModelStruct::new(
            "posts",
            StructField::primary("id", ValueType::Integer).on_create(Constraint::Empty),
        )
        .with_field(
            StructField::attribute("title", ValueType::String)
                .on_create(Constraint::Required)
                .on_create(Constraint::Length {
                    min: Some(3),
                    max: Some(10),
                })
                .on_patch(Constraint::Length {
                    min: Some(3),
                    max: Some(10),
                }),
        )
    }

    #[test]
    fn test_create_collects_every_violation() {
        let model = posts();
        let body = Resource::new(4);
        let errors = validate_resource(&model, &body, ValidationMode::Create);
        let kinds: Vec<_> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::InvalidJsonFieldValue, ErrorKind::MissingRequiredJsonField]
        );
    }

    #[test]
    fn test_length_applies_only_when_present_on_patch() {
        let model = posts();
        assert!(validate_resource(&model, &Resource::new(1), ValidationMode::Patch).is_empty());

        let long = Resource::new(1).with_attribute("title", "far too long a title");
        let errors = validate_resource(&model, &long, ValidationMode::Patch);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::InvalidJsonFieldValue);
    }
}

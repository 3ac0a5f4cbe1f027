use log::{debug, warn};
use serde_json::Value;

use crate::error::HandlerError;
use crate::logic::JsonApiHandler;
use crate::model::{
    ContextValue, FieldKind, FilterField, Operator, PresetFilter, PresetPair, RequestContext,
    Resource, Scope,
};
use crate::store::values_equal;

/// How precheck pairs act on the primary scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecheckMode {
    /// Compare the value's fields against the allowed set.
    Check,
    /// Compare fields the value carries, then restrict the scope.
    CheckAndFilter,
    /// Restrict the scope only.
    Filter,
}

/// Writes extracted values into the filter's value slot.
pub fn set_preset_filter_values(
    filter: &mut FilterField,
    values: Vec<Value>,
) -> Result<(), HandlerError> {
    let name = filter.name().to_string();
    let slot = filter
        .preset_slot()
        .ok_or_else(|| HandlerError::ValuePreset(format!("invalid preset filter '{}'", name)))?;
    slot.values = values;
    Ok(())
}

/// Writes preset values into the single value of the scope at the place the
/// filter points to. Relationship targets are dereferenced one level: to-one
/// relations get the first key, to-many relations get every key appended.
pub fn preset_scope_value(
    scope: &mut Scope,
    filter: &FilterField,
    values: Vec<Value>,
) -> Result<(), HandlerError> {
    let collection = scope.collection().to_string();
    let resource = scope
        .value_single_mut()
        .map_err(|e| HandlerError::ValuePreset(e.to_string()))?;
    let Some(first) = values.first().cloned() else {
        return Err(HandlerError::ValuePreset(format!(
            "no values to preset for '{}.{}'",
            collection,
            filter.name()
        )));
    };

    if let Some(sub) = filter.relationships.first() {
        if sub.kind() != FieldKind::Primary {
            return Err(HandlerError::ValuePreset(format!(
                "relationship '{}.{}' can only be preset by related key",
                collection,
                filter.name()
            )));
        }
        match filter.kind() {
            FieldKind::RelationshipSingle => {
                warn_if_truncated(&collection, filter, values.len());
                resource.set_value(&filter.field, first);
            }
            FieldKind::RelationshipMultiple => resource.append_related(&filter.field, values),
            _ => {
                return Err(HandlerError::ValuePreset(format!(
                    "filter on '{}.{}' has sub-filters but is not a relationship",
                    collection,
                    filter.name()
                )))
            }
        }
        return Ok(());
    }

    match filter.kind() {
        FieldKind::RelationshipMultiple => resource.append_related(&filter.field, values),
        _ => {
            warn_if_truncated(&collection, filter, values.len());
            resource.set_value(&filter.field, first);
        }
    }
    Ok(())
}

fn warn_if_truncated(collection: &str, filter: &FilterField, count: usize) {
    if count > 1 {
        warn!(
            "Preset of {} values into single valued field '{}.{}', only the first is used",
            count,
            collection,
            filter.name()
        );
    }
}

/// Checks that every value the scope holds for the filter's field is allowed
/// by the filter's values. Relationships are compared through their related
/// resources.
pub fn check_precheck_values(scope: &Scope, filter: &FilterField) -> Result<(), HandlerError> {
    let allowed = filter
        .precheck_values()
        .ok_or_else(|| {
            HandlerError::Internal(format!("precheck filter '{}' has no values", filter.name()))
        })?;
    if !allowed.operator.is_equality() {
        return Err(HandlerError::UnsupportedOperator(allowed.operator));
    }

    let resources = scope.resources();
    if resources.is_empty() {
        return Err(HandlerError::Internal(format!(
            "no value to precheck in scope of '{}'",
            scope.collection()
        )));
    }

    for resource in resources {
        if !check_single(resource, filter, allowed.operator, &allowed.values)? {
            return Err(HandlerError::ValueNotValid(format!(
                "'{}.{}' is outside of the allowed values",
                scope.collection(),
                filter.name()
            )));
        }
    }
    Ok(())
}

fn check_single(
    resource: &Resource,
    filter: &FilterField,
    operator: Operator,
    allowed: &[Value],
) -> Result<bool, HandlerError> {
    let Some(sub) = filter.relationships.first() else {
        return Ok(check_values(operator, allowed, &resource.field_values(&filter.field)));
    };

    let related = resource.related(&filter.field);
    match filter.kind() {
        FieldKind::RelationshipSingle => Ok(related
            .first()
            .map(|r| check_values(operator, allowed, &r.field_values(&sub.field)))
            .unwrap_or(false)),
        FieldKind::RelationshipMultiple => Ok(related
            .iter()
            .all(|r| check_values(operator, allowed, &r.field_values(&sub.field)))),
        _ => Err(HandlerError::Internal(format!(
            "invalid filter field kind for '{}'",
            filter.name()
        ))),
    }
}

/// `eq` and `ne` compare against exactly one allowed value; a rule that
/// extracted several can never be equal.
fn check_values(operator: Operator, allowed: &[Value], actual: &[Value]) -> bool {
    let listed = |v: &Value| allowed.iter().any(|a| values_equal(v, a));
    let equal = |v: &Value| allowed.len() == 1 && values_equal(v, &allowed[0]);
    match operator {
        Operator::Equal => !actual.is_empty() && actual.iter().all(equal),
        Operator::NotEqual => !actual.iter().any(equal),
        Operator::In => !actual.is_empty() && actual.iter().all(listed),
        _ => !actual.iter().any(listed),
    }
}

impl JsonApiHandler {
    /// Runs a rule's source scope and extracts the keys it yields. With an
    /// include chain the keys of the last included collection are returned.
    pub async fn get_preset_values(&self, mut scope: Scope) -> Result<Vec<Value>, HandlerError> {
        loop {
            debug!(
                "Getting preset values from {} with fieldset {:?}",
                scope.collection(),
                scope.fieldset
            );
            self.list_with_hooks(&mut scope).await?;
            if scope.resources().is_empty() {
                return Err(HandlerError::no_values(format!(
                    "no {} matches the preset scope",
                    scope.collection()
                )));
            }

            if !scope.next_included_field() {
                return Ok(scope.primary_values());
            }
            let index = scope.current_included_index()?;
            let missing = scope.missing_primaries(index)?;
            if missing.is_empty() {
                return Err(HandlerError::no_values(format!(
                    "no related {} for the preset scope",
                    scope.included_fields[index].field.name
                )));
            }

            let mut nested = scope.included_fields.swap_remove(index).scope;
            if nested.included_fields.is_empty() {
                return Ok(missing);
            }
            nested.set_id_filters(missing);
            scope = nested;
        }
    }

    /// Adds the filter carried by the request context under `key` to the
    /// rule's source scope. False when the rule has to be skipped.
    fn apply_context_filter(&self, scope: &mut Scope, key: &str, ctx: &RequestContext) -> bool {
        match ctx.get(key) {
            Some(ContextValue::Filter(filter)) => {
                scope.add_filter_field(filter.clone());
                true
            }
            Some(ContextValue::Values(_)) => {
                warn!(
                    "Context value '{}' for {} is not a filter, skipping rule",
                    key,
                    scope.collection()
                );
                false
            }
            None => {
                warn!(
                    "Context value '{}' for {} is not set, skipping rule",
                    key,
                    scope.collection()
                );
                false
            }
        }
    }

    /// Source scope of a rule with its context and chained filters, or None
    /// when the rule is skipped.
    fn rule_scope(
        &self,
        pair: &PresetPair,
        ctx: &RequestContext,
        previous: &[Value],
    ) -> Result<Option<Scope>, HandlerError> {
        let mut source = pair.scope.clone();
        if let Some(key) = &pair.key {
            if !self.apply_context_filter(&mut source, key, ctx) {
                return Ok(None);
            }
        }
        if let Some(chained) = &pair.chained {
            let mut chained = chained.clone();
            set_preset_filter_values(&mut chained, previous.to_vec())?;
            source.add_filter_field(chained);
        }
        Ok(Some(source))
    }

    /// Preset pairs on reads and deletes: the extracted keys restrict the scope.
    pub async fn apply_preset_pair_filters(
        &self,
        scope: &mut Scope,
        pairs: &[PresetPair],
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        let mut previous = Vec::new();
        for pair in pairs {
            let Some(source) = self.rule_scope(pair, ctx, &previous)? else {
                continue;
            };
            let values = self.get_preset_values(source).await?;
            previous = values.clone();
            let mut filter = pair.filter.clone();
            set_preset_filter_values(&mut filter, values)?;
            scope.add_filter_field(filter);
        }
        Ok(())
    }

    /// Preset pairs on creates and patches: the extracted keys are written
    /// into the resource.
    pub async fn apply_preset_pair_values(
        &self,
        scope: &mut Scope,
        pairs: &[PresetPair],
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        let mut previous = Vec::new();
        for pair in pairs {
            let Some(source) = self.rule_scope(pair, ctx, &previous)? else {
                continue;
            };
            let values = self.get_preset_values(source).await?;
            previous = values.clone();
            preset_scope_value(scope, &pair.filter, values)?;
        }
        Ok(())
    }

    pub async fn apply_precheck_pairs(
        &self,
        scope: &mut Scope,
        pairs: &[PresetPair],
        ctx: &RequestContext,
        mode: PrecheckMode,
    ) -> Result<(), HandlerError> {
        let mut previous = Vec::new();
        for pair in pairs {
            let Some(source) = self.rule_scope(pair, ctx, &previous)? else {
                continue;
            };
            let values = self.get_preset_values(source).await?;
            previous = values.clone();
            let mut filter = pair.filter.clone();
            set_preset_filter_values(&mut filter, values)?;

            let carried = scope
                .value_single()
                .map(|r| r.is_set(&filter.field))
                .unwrap_or(false);
            match mode {
                PrecheckMode::Check => check_precheck_values(scope, &filter)?,
                PrecheckMode::CheckAndFilter if carried => check_precheck_values(scope, &filter)?,
                _ => {}
            }
            if mode != PrecheckMode::Check {
                scope.add_filter_field(filter);
            }
        }
        Ok(())
    }

    /// Preset filters: values from the request context restrict the scope.
    /// A missing context value leaves the filter empty, which matches nothing.
    pub fn apply_preset_filters(
        &self,
        scope: &mut Scope,
        filters: &[PresetFilter],
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        for preset in filters {
            let mut filter = preset.filter.clone();
            if let Some(values) = self.context_values(&preset.key, ctx)? {
                set_preset_filter_values(&mut filter, values)?;
            }
            scope.add_filter_field(filter);
        }
        Ok(())
    }

    /// Preset filters on creates and patches: context values are written into
    /// the resource.
    pub fn apply_preset_filter_values(
        &self,
        scope: &mut Scope,
        filters: &[PresetFilter],
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        for preset in filters {
            if let Some(values) = self.context_values(&preset.key, ctx)? {
                let mut filter = preset.filter.clone();
                set_preset_filter_values(&mut filter, values.clone())?;
                preset_scope_value(scope, &filter, values)?;
            }
        }
        Ok(())
    }

    /// Precheck filters apply only when the context carries their value.
    pub fn apply_precheck_filters(
        &self,
        scope: &mut Scope,
        filters: &[PresetFilter],
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        for precheck in filters {
            debug!("Adding precheck filter: {}", precheck.filter.name());
            if let Some(values) = self.context_values(&precheck.key, ctx)? {
                let mut filter = precheck.filter.clone();
                set_preset_filter_values(&mut filter, values)?;
                scope.add_filter_field(filter);
            }
        }
        Ok(())
    }

    /// Precheck filters on creates and patches: the resource's own values must
    /// be among the context values. With `carried_only` fields the body does
    /// not carry are left alone.
    pub fn check_precheck_filters(
        &self,
        scope: &Scope,
        filters: &[PresetFilter],
        ctx: &RequestContext,
        carried_only: bool,
    ) -> Result<(), HandlerError> {
        for precheck in filters {
            let Some(values) = self.context_values(&precheck.key, ctx)? else {
                continue;
            };
            let carried = scope
                .value_single()
                .map(|r| r.is_set(&precheck.filter.field))
                .unwrap_or(false);
            if carried_only && !carried {
                continue;
            }
            let mut filter = precheck.filter.clone();
            set_preset_filter_values(&mut filter, values)?;
            check_precheck_values(scope, &filter)?;
        }
        Ok(())
    }

    fn context_values(
        &self,
        key: &str,
        ctx: &RequestContext,
    ) -> Result<Option<Vec<Value>>, HandlerError> {
        match ctx.get(key) {
            Some(ContextValue::Values(values)) => Ok(Some(values.clone())),
            Some(ContextValue::Filter(_)) => {
                self.handle_handler_error(HandlerError::Warning(format!(
                    "context value '{}' is a filter where values were expected",
                    key
                )))?;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoValuesOrigin;
    use crate::model::{StructField, ValueType};
    use crate::test_support::{blog_handler, blog_registry};

    fn post_filter() -> FilterField {
        FilterField::new(StructField::to_one("post", "posts")).with_relationship(
            FilterField::new(StructField::primary("id", ValueType::Integer))
                .with_values(Operator::In, vec![]),
        )
    }

    #[tokio::test]
    async fn test_preset_values_follow_include_chain() {
        let (handler, repo) = blog_handler();
        let registry = blog_registry();

        let mut source = Scope::new(registry.get("blogs").unwrap());
        source.set_id_filters(vec![Value::from(1), Value::from(2)]);
        source.include(&registry, "post").unwrap();

        let mut values = handler.get_preset_values(source).await.unwrap();
        values.sort_by_key(|v| v.as_i64());
        assert_eq!(values, vec![Value::from(1), Value::from(5)]);
        assert_eq!(repo.list_calls("blogs"), 1);
        assert_eq!(repo.list_calls("posts"), 0);
    }

    #[tokio::test]
    async fn test_zero_rows_is_no_values() {
        let (handler, _) = blog_handler();
        let registry = blog_registry();
        let mut source = Scope::new(registry.get("blogs").unwrap());
        source.set_id_filters(vec![Value::from(99)]);

        let err = handler.get_preset_values(source).await.unwrap_err();
        assert!(matches!(
            err,
            HandlerError::NoValues {
                origin: NoValuesOrigin::Preset,
                ..
            }
        ));
        assert_eq!(
            handler.handle_handler_error(err).unwrap_err().kind,
            crate::error::ErrorKind::InsufficientAccessPermission
        );
    }

    #[tokio::test]
    async fn test_later_rule_sees_earlier_rule_keys() {
        let (handler, repo) = blog_handler();
        let registry = blog_registry();

        // Polish blogs, then the posts of those blogs.
        let mut polish = Scope::new(registry.get("blogs").unwrap());
        polish.add_filter_field(
            FilterField::new(StructField::attribute("lang", ValueType::String).langtag())
                .with_values(Operator::Equal, vec![Value::from("pl")]),
        );
        let blog_ids = PresetPair::new(
            polish,
            FilterField::new(StructField::attribute("blog_id", ValueType::Integer))
                .with_values(Operator::In, vec![]),
        );
        let post_ids = PresetPair::new(
            Scope::new(registry.get("posts").unwrap()),
            FilterField::new(StructField::primary("id", ValueType::Integer))
                .with_values(Operator::In, vec![]),
        )
        .chained_to_previous(
            FilterField::new(StructField::attribute("blog_id", ValueType::Integer))
                .with_values(Operator::In, vec![]),
        );

        let mut scope = Scope::new(registry.get("posts").unwrap());
        handler
            .apply_preset_pair_filters(
                &mut scope,
                &[blog_ids.clone(), post_ids.clone()],
                &RequestContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(repo.take_calls(), vec!["list blogs", "list posts"]);
        assert_eq!(scope.attribute_filters[0].values[0].values, vec![Value::from(3)]);
        assert_eq!(scope.primary_filters[0].values[0].values, vec![Value::from(7)]);

        // Reversed, the chained rule runs with nothing before it and finds nothing.
        let mut scope = Scope::new(registry.get("posts").unwrap());
        let err = handler
            .apply_preset_pair_filters(&mut scope, &[post_ids, blog_ids], &RequestContext::new())
            .await
            .unwrap_err();
        assert!(err.is_no_values());
        assert_eq!(repo.take_calls(), vec!["list posts"]);
        assert!(scope.has_no_filters());
    }

    #[tokio::test]
    async fn test_failed_rule_stops_later_rules() {
        let (handler, repo) = blog_handler();
        let registry = blog_registry();

        let mut empty = Scope::new(registry.get("blogs").unwrap());
        empty.set_id_filters(vec![Value::from(404)]);
        let pairs = vec![
            PresetPair::new(empty, post_filter()),
            PresetPair::new(Scope::new(registry.get("posts").unwrap()), post_filter()),
        ];

        let mut scope = Scope::new(registry.get("blogs").unwrap());
        let err = handler
            .apply_preset_pair_filters(&mut scope, &pairs, &RequestContext::new())
            .await
            .unwrap_err();
        assert!(err.is_no_values());
        assert_eq!(repo.take_calls(), vec!["list blogs"]);
        assert!(scope.relationship_filters.is_empty());
    }

    #[test]
    fn test_precheck_rejects_value_outside_allowed_set() {
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.new_value_single(Resource::default().with_to_one("post", 7));

        let mut filter = post_filter();
        set_preset_filter_values(&mut filter, vec![Value::from(1), Value::from(5)]).unwrap();
        assert!(matches!(
            check_precheck_values(&scope, &filter),
            Err(HandlerError::ValueNotValid(_))
        ));

        scope.new_value_single(Resource::default().with_to_one("post", 5));
        assert!(check_precheck_values(&scope, &filter).is_ok());
    }

    #[test]
    fn test_precheck_dereferences_to_many_relationships() {
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("posts").unwrap());
        scope.new_value_single(Resource::default().with_to_many("comments", [1, 9]));

        let comments = StructField::to_many("comments", "comments");
        let mut filter = FilterField::new(comments).with_relationship(
            FilterField::new(StructField::primary("id", ValueType::Integer))
                .with_values(Operator::In, vec![]),
        );
        set_preset_filter_values(&mut filter, vec![Value::from(1), Value::from(2)]).unwrap();
        assert!(matches!(
            check_precheck_values(&scope, &filter),
            Err(HandlerError::ValueNotValid(_))
        ));

        scope.new_value_single(Resource::default().with_to_many("comments", [2, 1]));
        assert!(check_precheck_values(&scope, &filter).is_ok());
    }

    #[test]
    fn test_eq_precheck_needs_a_single_allowed_value() {
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("posts").unwrap());
        scope.new_value_single(Resource::default().with_attribute("author_id", 1));
        let author = |operator, values: &[i64]| {
            FilterField::new(StructField::attribute("author_id", ValueType::Integer))
                .with_values(operator, values.iter().map(|v| Value::from(*v)).collect())
        };

        assert!(check_precheck_values(&scope, &author(Operator::Equal, &[1])).is_ok());
        assert!(matches!(
            check_precheck_values(&scope, &author(Operator::Equal, &[1, 2])),
            Err(HandlerError::ValueNotValid(_))
        ));
        assert!(check_precheck_values(&scope, &author(Operator::In, &[1, 2])).is_ok());
        assert!(check_precheck_values(&scope, &author(Operator::NotEqual, &[1, 2])).is_ok());
        assert!(matches!(
            check_precheck_values(&scope, &author(Operator::NotEqual, &[1])),
            Err(HandlerError::ValueNotValid(_))
        ));
    }

    #[tokio::test]
    async fn test_keyed_rule_needs_a_context_filter() {
        let (handler, repo) = blog_handler();
        let registry = blog_registry();
        let source = Scope::new_keys_only(registry.get("posts").unwrap());
        let pair = PresetPair::new(source, post_filter()).with_key("post_title");

        let mut scope = Scope::new(registry.get("blogs").unwrap());
        let skipped = [
            RequestContext::new(),
            RequestContext::new().with_values("post_title", vec![Value::from("Pinning")]),
        ];
        for ctx in &skipped {
            handler
                .apply_preset_pair_filters(&mut scope, std::slice::from_ref(&pair), ctx)
                .await
                .unwrap();
        }
        assert!(repo.take_calls().is_empty());
        assert!(scope.has_no_filters());

        let title = FilterField::new(StructField::attribute("title", ValueType::String))
            .with_values(Operator::Equal, vec![Value::from("Pinning")]);
        let ctx = RequestContext::new().with_filter("post_title", title);
        handler
            .apply_preset_pair_filters(&mut scope, &[pair], &ctx)
            .await
            .unwrap();
        assert_eq!(repo.take_calls(), vec!["list posts"]);
        assert_eq!(
            scope.relationship_filters[0].relationships[0].values[0].values,
            vec![Value::from(5)]
        );
    }

    #[test]
    fn test_precheck_range_operator_is_unsupported() {
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.new_value_single(Resource::default().with_attribute("title", "x"));
        let filter = FilterField::new(StructField::attribute("title", ValueType::String))
            .with_values(Operator::GreaterThan, vec![Value::from("a")]);

        let err = check_precheck_values(&scope, &filter).unwrap_err();
        assert!(matches!(err, HandlerError::UnsupportedOperator(Operator::GreaterThan)));
    }

    #[test]
    fn test_preset_scope_value_dereferences_relationships() {
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("posts").unwrap());
        scope.new_value_single(Resource::default());

        let field = StructField::to_many("comments", "comments");
        let comments = FilterField::new(field).with_relationship(
            FilterField::new(StructField::primary("id", ValueType::Integer))
                .with_values(Operator::In, vec![]),
        );
        preset_scope_value(&mut scope, &comments, vec![Value::from(1), Value::from(2)]).unwrap();

        let blog_id = FilterField::new(StructField::attribute("blog_id", ValueType::Integer))
            .with_values(Operator::Equal, vec![]);
        preset_scope_value(&mut scope, &blog_id, vec![Value::from(3)]).unwrap();

        let post = scope.value_single().unwrap();
        assert_eq!(post.attributes["blog_id"], Value::from(3));
        assert_eq!(
            post.relationships["comments"].ids(),
            vec![Value::from(1), Value::from(2)]
        );
        assert!(matches!(
            preset_scope_value(&mut scope, &blog_id, vec![]),
            Err(HandlerError::ValuePreset(_))
        ));
    }
}

use log::debug;

use crate::error::{HandlerError, NoValuesOrigin};
use crate::logic::{JsonApiHandler, PrecheckMode};
use crate::model::{EndpointKind, FieldKind, FilterField, Operator, RequestContext, Scope};

impl JsonApiHandler {
    /// Rewrites every relationship filter of the scope into a filter on the
    /// related keys, one round trip per filter, in order.
    pub async fn resolve_relationship_filters(
        &self,
        scope: &mut Scope,
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        let filters = std::mem::take(&mut scope.relationship_filters);
        let mut resolved = Vec::with_capacity(filters.len());
        for filter in filters {
            resolved.push(self.resolve_relationship_filter(filter, ctx).await?);
        }
        scope.relationship_filters = resolved;
        Ok(())
    }

    async fn resolve_relationship_filter(
        &self,
        filter: FilterField,
        ctx: &RequestContext,
    ) -> Result<FilterField, HandlerError> {
        let related = filter
            .related_collection()
            .ok_or_else(|| {
                HandlerError::Internal(format!("'{}' has no related collection", filter.name()))
            })?
            .to_string();
        let model = self
            .registry()
            .get(&related)
            .ok_or_else(|| HandlerError::NoModel(related.clone()))?;

        let mut related_scope = Scope::new_keys_only(model.clone());

        // Access rules of the related list apply through the relationship too.
        let mut prechecked = false;
        if let Some(endpoint) = self
            .model_handler(&related)
            .and_then(|handler| handler.endpoint(EndpointKind::List))
        {
            self.apply_precheck_pairs(
                &mut related_scope,
                &endpoint.precheck_pairs,
                ctx,
                PrecheckMode::Filter,
            )
            .await?;
            self.apply_precheck_filters(&mut related_scope, &endpoint.precheck_filters, ctx)?;
            prechecked = !related_scope.has_no_filters();
        }

        let mut only_primary = true;
        for sub in &filter.relationships {
            match sub.kind() {
                FieldKind::Primary => related_scope.primary_filters.push(sub.clone()),
                FieldKind::Attribute => {
                    only_primary = false;
                    related_scope.add_filter_field(sub.clone());
                }
                FieldKind::RelationshipSingle | FieldKind::RelationshipMultiple => {
                    return Err(HandlerError::UnsupportedFilter(format!(
                        "nested relationship filter '{}.{}' is not supported",
                        filter.name(),
                        sub.name()
                    )))
                }
            }
        }

        if only_primary && !prechecked {
            debug!("Relationship filter on '{}' only uses related keys", filter.name());
            return Ok(filter);
        }

        self.list_with_hooks(&mut related_scope).await?;

        let ids = related_scope.primary_values();
        if ids.is_empty() {
            return Err(HandlerError::NoValues {
                origin: NoValuesOrigin::Relationship { collection: related },
                message: format!(
                    "no {} matches the filter on '{}'",
                    model.collection(),
                    filter.name()
                ),
            });
        }

        let primary = FilterField::new(model.primary().clone()).with_values(Operator::In, ids);
        Ok(FilterField::new(filter.field).with_relationship(primary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::filter_field;
    use crate::model::{Endpoint, PresetFilter, StructField, ValueType};
    use crate::seed::USER_ID;
    use crate::test_support::{blog_handler, blog_handler_with, blog_registry, endpoint_mut};
    use serde_json::Value;

    fn post_title_filter(title: &str) -> FilterField {
        FilterField::new(StructField::to_one("post", "posts")).with_relationship(
            FilterField::new(StructField::attribute("title", ValueType::String))
                .with_values(Operator::Equal, vec![Value::from(title)]),
        )
    }

    #[tokio::test]
    async fn test_attribute_filter_becomes_key_filter() {
        let (handler, repo) = blog_handler();
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.add_filter_field(post_title_filter("Ownership"));

        handler
            .resolve_relationship_filters(&mut scope, &RequestContext::new())
            .await
            .unwrap();

        assert_eq!(repo.take_calls(), vec!["list posts"]);
        let resolved = &scope.relationship_filters[0];
        assert_eq!(resolved.name(), "post");
        assert_eq!(resolved.relationships.len(), 1);
        assert_eq!(resolved.relationships[0].kind(), FieldKind::Primary);
        assert_eq!(resolved.relationships[0].values[0].operator, Operator::In);
        assert_eq!(resolved.relationships[0].values[0].values, vec![Value::from(1)]);
    }

    #[tokio::test]
    async fn test_key_only_filter_skips_round_trip() {
        let (handler, repo) = blog_handler();
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        let filter = FilterField::new(StructField::to_one("post", "posts")).with_relationship(
            FilterField::new(StructField::primary("id", ValueType::Integer))
                .with_values(Operator::Equal, vec![Value::from(1)]),
        );
        scope.add_filter_field(filter.clone());

        handler
            .resolve_relationship_filters(&mut scope, &RequestContext::new())
            .await
            .unwrap();
        assert!(repo.take_calls().is_empty());
        assert_eq!(scope.relationship_filters, vec![filter]);
    }

    #[tokio::test]
    async fn test_related_list_prechecks_apply_through_relationship() {
        // Posts can only be listed by their author.
        let (handler, repo) = blog_handler_with(|registry, handlers| {
            let author = filter_field(registry, "posts", "author_id", Operator::In).unwrap();
            *endpoint_mut(handlers, "posts", EndpointKind::List) = Endpoint::new(EndpointKind::List)
                .with_precheck_filter(PresetFilter::new(USER_ID, author));
        });
        let registry = blog_registry();
        let key_filter = FilterField::new(StructField::to_one("post", "posts")).with_relationship(
            FilterField::new(StructField::primary("id", ValueType::Integer))
                .with_values(Operator::In, vec![Value::from(1), Value::from(7)]),
        );
        let author = RequestContext::new().with_values(USER_ID, vec![Value::from(1)]);

        // A key-only filter still needs the round trip once the rule applies.
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.add_filter_field(key_filter.clone());
        handler
            .resolve_relationship_filters(&mut scope, &author)
            .await
            .unwrap();
        assert_eq!(repo.take_calls(), vec!["list posts"]);
        assert_eq!(
            scope.relationship_filters[0].relationships[0].values[0].values,
            vec![Value::from(1)]
        );

        // Without a user the rule has no value and the keys pass through.
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.add_filter_field(key_filter.clone());
        handler
            .resolve_relationship_filters(&mut scope, &RequestContext::new())
            .await
            .unwrap();
        assert!(repo.take_calls().is_empty());
        assert_eq!(scope.relationship_filters, vec![key_filter]);

        let response = handler
            .list("blogs", "filter[blogs][post][id]=1,7", &author)
            .await
            .unwrap();
        assert_eq!(response.scope.unwrap().primary_values(), vec![Value::from(2)]);
        assert_eq!(repo.take_calls(), vec!["list posts", "list blogs"]);
    }

    #[tokio::test]
    async fn test_no_related_match_is_scoped_to_related_collection() {
        let (handler, _) = blog_handler();
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.add_filter_field(post_title_filter("Nothing like this"));

        let err = handler
            .resolve_relationship_filters(&mut scope, &RequestContext::new())
            .await
            .unwrap_err();
        match err {
            HandlerError::NoValues {
                origin: NoValuesOrigin::Relationship { collection },
                ..
            } => assert_eq!(collection, "posts"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nested_relationship_sub_filter_is_unsupported() {
        let (handler, _) = blog_handler();
        let registry = blog_registry();
        let mut scope = Scope::new(registry.get("blogs").unwrap());
        scope.add_filter_field(
            FilterField::new(StructField::to_one("post", "posts")).with_relationship(
                FilterField::new(StructField::to_many("comments", "comments"))
                    .with_values(Operator::In, vec![Value::from(1)]),
            ),
        );

        let err = handler
            .resolve_relationship_filters(&mut scope, &RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnsupportedFilter(_)));
    }
}

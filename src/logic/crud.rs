use log::{debug, error};
use serde_json::Value;

use crate::codec::{build_scope, parse_key, unmarshal_resource};
use crate::error::{
    ApiError, ErrorKind, ErrorResponse, HandlerError, StorageError, StorageErrorKind,
};
use crate::logic::{
    hooks, validate_resource, JsonApiHandler, LanguageTag, PrecheckMode, ValidationMode,
};
use crate::model::{
    Endpoint, EndpointKind, FieldKind, HookKind, ModelStruct, Pagination, RequestContext, Resource,
    Scope, ScopeValue, StructField,
};
use crate::store::values_equal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Created,
    NoContent,
}

impl ResponseStatus {
    pub fn code(&self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::Created => 201,
            ResponseStatus::NoContent => 204,
        }
    }
}

/// Outcome of a successful operation, ready to be marshalled.
#[derive(Debug)]
pub struct Response {
    pub status: ResponseStatus,
    pub scope: Option<Scope>,
    pub content_language: Option<String>,
    pub identifiers_only: bool,
}

impl Response {
    fn new(status: ResponseStatus, scope: Option<Scope>) -> Self {
        Self {
            status,
            scope,
            content_language: None,
            identifiers_only: false,
        }
    }

    fn with_language(mut self, tag: Option<&LanguageTag>) -> Self {
        self.content_language = tag.map(|t| t.to_string());
        self
    }

    fn identifiers(mut self) -> Self {
        self.identifiers_only = true;
        self
    }
}

pub type OperationResult = Result<Response, ErrorResponse>;

impl JsonApiHandler {
    pub async fn create(
        &self,
        collection: &str,
        body: &[u8],
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::Create)?;
        let model = self.model(collection)?;

        let resource = unmarshal_resource(self.registry(), &model, body)?;
        let errors = validate_resource(&model, &resource, ValidationMode::Create);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let mut scope = Scope::new(model.clone());
        scope.new_value_single(resource);
        let tag = if model.use_i18n() {
            Some(self.check_value_language(&mut scope)?)
        } else {
            None
        };

        self.stage(self.apply_preset_pair_values(&mut scope, &endpoint.preset_pairs, ctx).await)?;
        self.stage(self.apply_preset_filter_values(&mut scope, &endpoint.preset_filters, ctx))?;
        self.stage(
            self.apply_precheck_pairs(
                &mut scope,
                &endpoint.precheck_pairs,
                ctx,
                PrecheckMode::Check,
            )
            .await,
        )?;
        self.stage(self.check_precheck_filters(&scope, &endpoint.precheck_filters, ctx, false))?;

        hooks::dispatch(HookKind::BeforeCreate, &mut scope)?;
        self.repository_for(collection)
            .create(&mut scope)
            .await
            .map_err(|e| self.manage_storage_error(&e))?;
        hooks::dispatch(HookKind::AfterCreate, &mut scope)?;

        Ok(Response::new(ResponseStatus::Created, Some(scope)).with_language(tag.as_ref()))
    }

    pub async fn get(
        &self,
        collection: &str,
        id: &str,
        query: &str,
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::Get)?;
        let model = self.model(collection)?;
        let id = parse_path_id(&model, id)?;

        let mut scope = build_scope(self.registry(), model, query).map_err(ApiError::from)?;
        scope.set_id_filters(vec![id.clone()]);
        let tag = self.read_language(&mut scope, ctx)?;

        self.stage(self.apply_read_rules(&mut scope, endpoint, ctx).await)?;

        scope.new_value_single(Resource::new(id));
        hooks::dispatch(HookKind::BeforeRead, &mut scope)?;
        self.repository_for(collection)
            .get(&mut scope)
            .await
            .map_err(|e| self.manage_storage_error(&e))?;
        hooks::dispatch(HookKind::AfterRead, &mut scope)?;

        self.stage(self.get_included(&mut scope, tag.as_ref()).await)?;
        Ok(Response::new(ResponseStatus::Ok, Some(scope)).with_language(tag.as_ref()))
    }

    pub async fn list(
        &self,
        collection: &str,
        query: &str,
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::List)?;
        let model = self.model(collection)?;

        let mut scope = build_scope(self.registry(), model, query).map_err(ApiError::from)?;
        if scope.pagination.is_none() {
            scope.pagination = endpoint.preset_paginate.clone().or_else(|| {
                self.default_page_limit().map(|limit| Pagination {
                    limit: Some(limit),
                    offset: None,
                })
            });
        }
        if !endpoint.preset_sort.is_empty() {
            let requested = std::mem::take(&mut scope.sorts);
            scope.sorts = endpoint.preset_sort.iter().cloned().chain(requested).collect();
        }
        scope.count_list = endpoint.count_list;
        let tag = self.read_language(&mut scope, ctx)?;

        match self.apply_read_rules(&mut scope, endpoint, ctx).await {
            Ok(()) => {}
            Err(err) if err.is_no_values() => {
                debug!("List of {} resolved to no values: {}", collection, err);
                scope.new_value_many();
                if scope.count_list {
                    scope.total = Some(0);
                }
                let response = Response::new(ResponseStatus::Ok, Some(scope));
                return Ok(response.with_language(tag.as_ref()));
            }
            Err(err) => self.handle_handler_error(err)?,
        }

        self.stage(self.list_with_hooks(&mut scope).await)?;
        self.stage(self.get_included(&mut scope, tag.as_ref()).await)?;
        Ok(Response::new(ResponseStatus::Ok, Some(scope)).with_language(tag.as_ref()))
    }

    pub async fn patch(
        &self,
        collection: &str,
        id: &str,
        body: &[u8],
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::Patch)?;
        let model = self.model(collection)?;
        let id = parse_path_id(&model, id)?;

        let mut resource = unmarshal_resource(self.registry(), &model, body)?;
        if resource.has_id() && !values_equal(&resource.id, &id) {
            return Err(ApiError::with_detail(
                ErrorKind::InvalidInput,
                "The resource id does not match the id in the path.",
            )
            .into());
        }
        resource.id = id.clone();
        let errors = validate_resource(&model, &resource, ValidationMode::Patch);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let language_carried = model
            .language_field()
            .is_some_and(|field| resource.is_set(field));
        let mut scope = Scope::new(model);
        scope.new_value_single(resource);
        scope.set_id_filters(vec![id]);
        scope.get_modified_result = endpoint.get_modified_result;
        let tag = if language_carried {
            Some(self.check_value_language(&mut scope)?)
        } else {
            None
        };

        self.stage(self.apply_preset_pair_values(&mut scope, &endpoint.preset_pairs, ctx).await)?;
        self.stage(self.apply_preset_filter_values(&mut scope, &endpoint.preset_filters, ctx))?;
        self.stage(
            self.apply_precheck_pairs(
                &mut scope,
                &endpoint.precheck_pairs,
                ctx,
                PrecheckMode::CheckAndFilter,
            )
            .await,
        )?;
        self.stage(self.check_precheck_filters(&scope, &endpoint.precheck_filters, ctx, true))?;
        self.stage(self.apply_precheck_filters(&mut scope, &endpoint.precheck_filters, ctx))?;

        hooks::dispatch(HookKind::BeforePatch, &mut scope)?;
        self.repository_for(collection)
            .patch(&mut scope)
            .await
            .map_err(|e| self.write_storage_error(&e, endpoint))?;
        hooks::dispatch(HookKind::AfterPatch, &mut scope)?;

        if scope.get_modified_result {
            Ok(Response::new(ResponseStatus::Ok, Some(scope)).with_language(tag.as_ref()))
        } else {
            Ok(Response::new(ResponseStatus::NoContent, None))
        }
    }

    pub async fn delete(
        &self,
        collection: &str,
        id: &str,
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::Delete)?;
        let model = self.model(collection)?;
        let id = parse_path_id(&model, id)?;

        let mut scope = Scope::new_keys_only(model);
        scope.set_id_filters(vec![id.clone()]);
        self.stage(self.apply_read_rules(&mut scope, endpoint, ctx).await)?;

        scope.new_value_single(Resource::new(id));
        hooks::dispatch(HookKind::BeforeDelete, &mut scope)?;
        self.repository_for(collection)
            .delete(&mut scope)
            .await
            .map_err(|e| self.write_storage_error(&e, endpoint))?;
        hooks::dispatch(HookKind::AfterDelete, &mut scope)?;

        Ok(Response::new(ResponseStatus::NoContent, None))
    }

    /// Related resources of one relationship, read through the related
    /// collection's repository and shaped by `query`.
    pub async fn get_related(
        &self,
        collection: &str,
        id: &str,
        relation: &str,
        query: &str,
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::GetRelated)?;
        let (field, root) = self
            .fetch_relation_root(collection, id, relation, endpoint, ctx)
            .await?;
        let related = self.model(field.related.as_deref().unwrap_or_default())?;
        let related_collection = related.collection().to_string();

        let mut scope = build_scope(self.registry(), related, query).map_err(ApiError::from)?;
        let tag = self.read_language(&mut scope, ctx)?;
        let ids = root.field_values(&field);

        if field.kind == FieldKind::RelationshipSingle {
            // An unset to-one relationship answers with null data.
            let Some(id) = ids.into_iter().next() else {
                return Ok(Response::new(ResponseStatus::Ok, Some(scope)));
            };
            scope.set_id_filters(vec![id.clone()]);
            self.stage(self.resolve_relationship_filters(&mut scope, ctx).await)?;

            scope.new_value_single(Resource::new(id));
            hooks::dispatch(HookKind::BeforeRead, &mut scope)?;
            self.repository_for(&related_collection)
                .get(&mut scope)
                .await
                .map_err(|e| self.manage_storage_error(&e))?;
            hooks::dispatch(HookKind::AfterRead, &mut scope)?;
        } else {
            if ids.is_empty() {
                scope.new_value_many();
                let response = Response::new(ResponseStatus::Ok, Some(scope));
                return Ok(response.with_language(tag.as_ref()));
            }
            scope.set_id_filters(ids);
            match self.resolve_relationship_filters(&mut scope, ctx).await {
                Ok(()) => self.stage(self.list_with_hooks(&mut scope).await)?,
                Err(err) if err.is_no_values() => scope.new_value_many(),
                Err(err) => self.handle_handler_error(err)?,
            }
        }

        self.stage(self.get_included(&mut scope, tag.as_ref()).await)?;
        Ok(Response::new(ResponseStatus::Ok, Some(scope)).with_language(tag.as_ref()))
    }

    /// Identifiers of the resources one relationship points to.
    pub async fn get_relationship(
        &self,
        collection: &str,
        id: &str,
        relation: &str,
        ctx: &RequestContext,
    ) -> OperationResult {
        let endpoint = self.endpoint(collection, EndpointKind::GetRelationship)?;
        let (field, root) = self
            .fetch_relation_root(collection, id, relation, endpoint, ctx)
            .await?;
        let related = self.model(field.related.as_deref().unwrap_or_default())?;

        let mut scope = Scope::new_keys_only(related);
        let ids = root.field_values(&field);
        match field.kind {
            FieldKind::RelationshipSingle => {
                if let Some(id) = ids.into_iter().next() {
                    scope.new_value_single(Resource::new(id));
                }
            }
            _ => scope.value = ScopeValue::Many(ids.into_iter().map(Resource::new).collect()),
        }
        Ok(Response::new(ResponseStatus::Ok, Some(scope)).identifiers())
    }

    /// Reads the root resource of a relationship request with the rules of
    /// the root endpoint applied.
    async fn fetch_relation_root(
        &self,
        collection: &str,
        id: &str,
        relation: &str,
        endpoint: &Endpoint,
        ctx: &RequestContext,
    ) -> Result<(StructField, Resource), ErrorResponse> {
        let model = self.model(collection)?;
        let field = model
            .field(relation)
            .filter(|f| f.is_relationship() && !f.hidden)
            .cloned()
            .ok_or_else(|| {
                ApiError::with_detail(
                    ErrorKind::InvalidResourceName,
                    format!("'{}' is not a relationship of '{}'", relation, collection),
                )
            })?;
        let id = parse_path_id(&model, id)?;

        let mut root = Scope::new_keys_only(model);
        root.fieldset.insert(field.name.clone());
        root.set_id_filters(vec![id.clone()]);
        self.stage(self.apply_read_rules(&mut root, endpoint, ctx).await)?;

        root.new_value_single(Resource::new(id));
        hooks::dispatch(HookKind::BeforeRead, &mut root)?;
        self.repository_for(collection)
            .get(&mut root)
            .await
            .map_err(|e| self.manage_storage_error(&e))?;
        hooks::dispatch(HookKind::AfterRead, &mut root)?;

        let resource = root.value_single().map_err(|e| {
            error!("Relationship root of {} has no value: {}", collection, e);
            ApiError::internal()
        })?;
        Ok((field, resource.clone()))
    }

    /// Rule stages shared by reads and deletes, in order.
    async fn apply_read_rules(
        &self,
        scope: &mut Scope,
        endpoint: &Endpoint,
        ctx: &RequestContext,
    ) -> Result<(), HandlerError> {
        self.apply_preset_pair_filters(scope, &endpoint.preset_pairs, ctx).await?;
        self.apply_preset_filters(scope, &endpoint.preset_filters, ctx)?;
        self.apply_precheck_pairs(scope, &endpoint.precheck_pairs, ctx, PrecheckMode::Filter)
            .await?;
        self.apply_precheck_filters(scope, &endpoint.precheck_filters, ctx)?;
        self.resolve_relationship_filters(scope, ctx).await
    }

    /// Negotiated language of a read. Locale-aware collections are restricted
    /// to it unless the query already filters on the language.
    fn read_language(
        &self,
        scope: &mut Scope,
        ctx: &RequestContext,
    ) -> Result<Option<LanguageTag>, ApiError> {
        let Some(header) = ctx.accept_language.as_deref() else {
            return Ok(None);
        };
        let tag = self.negotiate_language(Some(header))?;
        if let Some(tag) = &tag {
            if scope.model().use_i18n() && scope.language_filter.is_none() {
                scope.set_language_filter(vec![tag.to_string()]).map_err(|e| {
                    error!("Cannot filter {} by language: {}", scope.collection(), e);
                    ApiError::internal()
                })?;
            }
        }
        Ok(tag)
    }

    fn stage(&self, result: Result<(), HandlerError>) -> Result<(), ErrorResponse> {
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.handle_handler_error(err).map_err(ErrorResponse::from),
        }
    }

    /// A write that matched nothing behind a precheck is reported as a
    /// permission failure, the row may exist but be out of reach.
    fn write_storage_error(&self, err: &StorageError, endpoint: &Endpoint) -> ApiError {
        if err.is(StorageErrorKind::NoResult) && endpoint.has_prechecks() {
            return ApiError::new(ErrorKind::InsufficientAccessPermission);
        }
        self.manage_storage_error(err)
    }
}

fn parse_path_id(model: &ModelStruct, id: &str) -> Result<Value, ApiError> {
    parse_key(model.primary(), &Value::String(id.to_string())).map_err(|_| {
        ApiError::with_detail(
            ErrorKind::InvalidInput,
            format!("'{}' is not a valid {} id", id, model.collection()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::preset_pair;
    use crate::model::{FilterField, Operator};
    use crate::test_support::{blog_handler, blog_handler_with, endpoint_mut};

    fn ids(response: &Response) -> Vec<Value> {
        response.scope.as_ref().unwrap().primary_values()
    }

    #[tokio::test]
    async fn test_list_blogs_by_current_post() {
        let (handler, repo) = blog_handler();
        let response = handler
            .list("blogs", "filter[blogs][post][id]=1", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![Value::from(2)]);
        assert_eq!(repo.take_calls(), vec!["list blogs"]);
    }

    #[tokio::test]
    async fn test_relationship_filter_matches_join() {
        let (handler, repo) = blog_handler();
        for (post, comments) in [(20, [20, 21]), (21, [22, 23]), (22, [24, 25])] {
            repo.insert("posts", Resource::new(post).with_to_many("comments", comments))
                .await;
            for comment in comments {
                let body = if comment == 23 { "needle" } else { "hay" };
                repo.insert(
                    "comments",
                    Resource::new(comment)
                        .with_attribute("body", body)
                        .with_to_one("post", post),
                )
                .await;
            }
        }

        let response = handler
            .list("posts", "filter[posts][comments][body]=needle", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![Value::from(21)]);
        assert_eq!(repo.take_calls(), vec!["list comments", "list posts"]);
    }

    #[tokio::test]
    async fn test_unmatched_relationship_filter_lists_nothing() {
        let (handler, repo) = blog_handler();
        let response = handler
            .list("blogs", "filter[blogs][post][title]=Missing", &RequestContext::new())
            .await
            .unwrap();
        let scope = response.scope.unwrap();
        assert_eq!(scope.value, ScopeValue::Many(Vec::new()));
        assert_eq!(scope.total, Some(0));
        assert_eq!(repo.list_calls("blogs"), 0);
    }

    #[tokio::test]
    async fn test_list_counts_and_includes() {
        let (handler, _) = blog_handler();
        let response = handler
            .list("blogs", "include=post&page[limit]=2", &RequestContext::new())
            .await
            .unwrap();
        let scope = response.scope.unwrap();
        assert_eq!(scope.total, Some(3));
        assert_eq!(scope.primary_values(), vec![Value::from(1), Value::from(2)]);
        assert_eq!(scope.included_fields[0].scope.resources().len(), 2);
    }

    #[tokio::test]
    async fn test_accept_language_restricts_reads() {
        let (handler, _) = blog_handler();
        let ctx = RequestContext::new().with_language("pl-PL, en;q=0.5");
        let response = handler.list("blogs", "", &ctx).await.unwrap();
        assert_eq!(response.content_language.as_deref(), Some("pl"));
        assert_eq!(ids(&response), vec![Value::from(3)]);
    }

    #[tokio::test]
    async fn test_create_precheck_rejects_unknown_post() {
        let (handler, repo) = blog_handler();
        let body = br#"{"data":{"type":"comments","attributes":{"body":"hi"},
            "relationships":{"post":{"data":{"type":"posts","id":"99"}}}}}"#;
        let err = handler
            .create("comments", body, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::InvalidJsonFieldValue));
        assert_eq!(repo.take_calls(), vec!["list posts"]);

        let body = br#"{"data":{"type":"comments","attributes":{"body":"hi"},
            "relationships":{"post":{"data":{"type":"posts","id":"5"}}}}}"#;
        let response = handler
            .create("comments", body, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Created);
        assert_eq!(ids(&response), vec![Value::from(4)]);
    }

    #[tokio::test]
    async fn test_create_takes_post_from_keyed_preset_pair() {
        let (handler, repo) = blog_handler_with(|registry, handlers| {
            let pair = preset_pair(registry, "posts", "comments", "post.id", Operator::In)
                .unwrap()
                .with_key("post_title");
            endpoint_mut(handlers, "comments", EndpointKind::Create)
                .preset_pairs
                .push(pair);
        });
        let title = handler
            .registry()
            .get("posts")
            .unwrap()
            .field("title")
            .unwrap()
            .clone();
        let ctx = RequestContext::new().with_filter(
            "post_title",
            FilterField::new(title).with_values(Operator::Equal, vec![Value::from("Pinning")]),
        );

        let body = br#"{"data":{"type":"comments","attributes":{"body":"Nice"}}}"#;
        let response = handler.create("comments", body, &ctx).await.unwrap();
        let comment = response.scope.as_ref().unwrap().value_single().unwrap().clone();
        assert_eq!(comment.relationships["post"].ids(), vec![Value::from(5)]);
        assert_eq!(
            repo.take_calls(),
            vec!["list posts", "list posts", "create comments"]
        );

        // No context filter: the rule is skipped and the body's post is kept.
        let body = br#"{"data":{"type":"comments","attributes":{"body":"Nice"},
            "relationships":{"post":{"data":{"type":"posts","id":"1"}}}}}"#;
        let response = handler
            .create("comments", body, &RequestContext::new())
            .await
            .unwrap();
        let comment = response.scope.as_ref().unwrap().value_single().unwrap().clone();
        assert_eq!(comment.relationships["post"].ids(), vec![Value::from(1)]);
        assert_eq!(repo.take_calls(), vec!["list posts", "create comments"]);
    }

    #[tokio::test]
    async fn test_endpoint_pagination_applies_without_page_query() {
        let (handler, _) = blog_handler_with(|_, handlers| {
            *endpoint_mut(handlers, "comments", EndpointKind::List) =
                Endpoint::new(EndpointKind::List).with_pagination(Pagination {
                    limit: Some(2),
                    offset: None,
                });
        });
        let ctx = RequestContext::new();

        let response = handler.list("comments", "", &ctx).await.unwrap();
        assert_eq!(ids(&response).len(), 2);
        let response = handler.list("comments", "page[limit]=3", &ctx).await.unwrap();
        assert_eq!(ids(&response).len(), 3);
    }

    #[tokio::test]
    async fn test_create_presets_author_and_checks_language() {
        let (handler, _) = blog_handler();
        let ctx = RequestContext::new().with_values("user_id", vec![Value::from(7)]);
        let body = br#"{"data":{"type":"posts","attributes":{"title":"Traits"}}}"#;
        let response = handler.create("posts", body, &ctx).await.unwrap();
        let post = response.scope.as_ref().unwrap().value_single().unwrap().clone();
        assert_eq!(post.attributes["author_id"], Value::from(7));

        let body = br#"{"data":{"type":"blogs","attributes":{"title":"Hallo","lang":"de"}}}"#;
        let err = handler.create("blogs", body, &ctx).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::LanguageNotAcceptable));

        let body = br#"{"data":{"type":"blogs","attributes":{"lang":"en"}}}"#;
        let err = handler.create("blogs", body, &ctx).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::MissingRequiredJsonField));
    }

    #[tokio::test]
    async fn test_patch_outside_precheck_is_forbidden() {
        let (handler, repo) = blog_handler();
        let body = br#"{"data":{"type":"posts","id":"1","attributes":{"title":"Renamed"}}}"#;

        let stranger = RequestContext::new().with_values("user_id", vec![Value::from(2)]);
        let err = handler.patch("posts", "1", body, &stranger).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::InsufficientAccessPermission));

        let owner = RequestContext::new().with_values("user_id", vec![Value::from(1)]);
        let response = handler.patch("posts", "1", body, &owner).await.unwrap();
        assert_eq!(response.status, ResponseStatus::NoContent);
        assert_eq!(repo.take_calls(), vec!["patch posts", "patch posts"]);
    }

    #[tokio::test]
    async fn test_patch_returns_modified_resource() {
        let (handler, _) = blog_handler();
        let body = br#"{"data":{"type":"blogs","attributes":{"title":"Renamed"}}}"#;
        let response = handler
            .patch("blogs", "1", body, &RequestContext::new())
            .await
            .unwrap();
        let blog = response.scope.as_ref().unwrap().value_single().unwrap().clone();
        assert_eq!(blog.attributes["title"], Value::from("Renamed"));
        assert_eq!(blog.attributes["lang"], Value::from("en"));

        let mismatch = br#"{"data":{"type":"blogs","id":"2"}}"#;
        let err = handler
            .patch("blogs", "1", mismatch, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_delete() {
        let (handler, repo) = blog_handler();
        let ctx = RequestContext::new();
        let response = handler.delete("comments", "3", &ctx).await.unwrap();
        assert_eq!(response.status, ResponseStatus::NoContent);

        let err = handler.delete("comments", "3", &ctx).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::ResourceNotFound));

        let err = handler.delete("authors", "1", &ctx).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::EndpointForbidden));
        assert_eq!(repo.take_calls(), vec!["delete comments", "delete comments"]);
    }

    #[tokio::test]
    async fn test_get_related_and_relationship() {
        let (handler, _) = blog_handler();
        let ctx = RequestContext::new();

        let related = handler
            .get_related("blogs", "1", "post", "", &ctx)
            .await
            .unwrap();
        let post = related.scope.as_ref().unwrap().value_single().unwrap().clone();
        assert_eq!(post.id, Value::from(5));
        assert!(post.attributes.contains_key("title"));

        let relationship = handler
            .get_relationship("posts", "1", "comments", &ctx)
            .await
            .unwrap();
        assert!(relationship.identifiers_only);
        assert_eq!(ids(&relationship), vec![Value::from(1), Value::from(2)]);

        let err = handler
            .get_relationship("blogs", "1", "title", &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::InvalidResourceName));
    }

    #[tokio::test]
    async fn test_get_with_include_and_missing_id() {
        let (handler, _) = blog_handler();
        let ctx = RequestContext::new();
        let response = handler
            .get("posts", "1", "include=comments", &ctx)
            .await
            .unwrap();
        assert_eq!(response.scope.as_ref().unwrap().included_fields[0].scope.resources().len(), 2);

        let err = handler.get("posts", "404", "", &ctx).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::ResourceNotFound));
        let err = handler.get("posts", "abc", "", &ctx).await.unwrap_err();
        assert_eq!(err.first_kind(), Some(ErrorKind::InvalidInput));
    }
}

use anyhow::Result;
use log::info;
use std::collections::HashMap;

use crate::codec::{filter_field, preset_pair};
use crate::model::{
    ConfigError, Constraint, Endpoint, EndpointKind, ModelHandler, ModelRegistry, ModelStruct,
    Operator, PresetFilter, Resource, SchemaError, SortField, SortOrder, StructField, ValueType,
};
use crate::store::InMemoryRepository;

/// Request context key carrying the id of the authenticated user.
pub const USER_ID: &str = "user_id";

/// Models of the demo blog: blogs with a current post, posts with comments,
/// and read-only authors.
pub fn blog_registry() -> Result<ModelRegistry, SchemaError> {
    let mut registry = ModelRegistry::new();
    registry.register(
        ModelStruct::new("blogs", StructField::primary("id", ValueType::Integer))
            .with_field(
                StructField::attribute("title", ValueType::String)
                    .on_create(Constraint::Required)
                    .on_create(Constraint::Length {
                        min: None,
                        max: Some(100),
                    })
                    .on_patch(Constraint::Length {
                        min: Some(1),
                        max: Some(100),
                    }),
            )
            .with_field(StructField::attribute("lang", ValueType::String).langtag())
            .with_field(StructField::to_one("post", "posts")),
    )?;
    registry.register(
        ModelStruct::new("posts", StructField::primary("id", ValueType::Integer))
            .with_field(
                StructField::attribute("title", ValueType::String)
                    .on_create(Constraint::Required)
                    .on_patch(Constraint::Length {
                        min: Some(1),
                        max: Some(200),
                    }),
            )
            .with_field(StructField::attribute("body", ValueType::String))
            .with_field(StructField::attribute("blog_id", ValueType::Integer))
            .with_field(StructField::attribute("author_id", ValueType::Integer))
            .with_field(StructField::to_many("comments", "comments")),
    )?;
    registry.register(
        ModelStruct::new("comments", StructField::primary("id", ValueType::Integer))
            .with_field(
                StructField::attribute("body", ValueType::String).on_create(Constraint::Required),
            )
            .with_field(StructField::to_one("post", "posts").hidden()),
    )?;
    registry.register(
        ModelStruct::new("authors", StructField::primary("id", ValueType::Integer))
            .with_field(StructField::attribute("name", ValueType::String))
            .with_field(StructField::to_many("blogs", "blogs")),
    )?;
    registry.verify()?;
    Ok(registry)
}

/// Endpoint rules of the demo blog.
pub fn blog_model_handlers(registry: &ModelRegistry) -> Result<Vec<ModelHandler>, ConfigError> {
    let blog_id = registry
        .get("blogs")
        .map(|m| m.primary().clone())
        .ok_or_else(|| ConfigError::UnknownCollection("blogs".to_string()))?;

    let blogs = ModelHandler::with_kinds("blogs", EndpointKind::FULL_CRUD)
        .with_endpoint(
            Endpoint::new(EndpointKind::List)
                .with_sort(SortField {
                    field: blog_id,
                    order: SortOrder::Ascending,
                })
                .with_count_list(),
        )
        .with_endpoint(Endpoint::new(EndpointKind::Patch).with_modified_result());

    // Posts are written on behalf of the caller and only their author may change them.
    let posts = ModelHandler::with_kinds("posts", EndpointKind::FULL_CRUD)
        .with_endpoint(Endpoint::new(EndpointKind::Create).with_preset_filter(PresetFilter::new(
            USER_ID,
            filter_field(registry, "posts", "author_id", Operator::Equal)?,
        )))
        .with_endpoint(Endpoint::new(EndpointKind::Patch).with_precheck_filter(PresetFilter::new(
            USER_ID,
            filter_field(registry, "posts", "author_id", Operator::In)?,
        )))
        .with_endpoint(Endpoint::new(EndpointKind::Delete).with_precheck_filter(PresetFilter::new(
            USER_ID,
            filter_field(registry, "posts", "author_id", Operator::In)?,
        )));

    let comments = ModelHandler::with_kinds("comments", EndpointKind::FULL_CRUD).with_endpoint(
        Endpoint::new(EndpointKind::Create).with_precheck_pair(preset_pair(
            registry,
            "posts",
            "comments",
            "post.id",
            Operator::In,
        )?)?,
    );

    let authors = ModelHandler::with_kinds("authors", EndpointKind::READ_ONLY);

    Ok(vec![blogs, posts, comments, authors])
}

/// Rows of the demo blog.
pub fn seed_collections() -> HashMap<String, Vec<Resource>> {
    let blogs = vec![
        Resource::new(1)
            .with_attribute("title", "Fearless Concurrency")
            .with_attribute("lang", "en")
            .with_to_one("post", 5),
        Resource::new(2)
            .with_attribute("title", "Borrowed Time")
            .with_attribute("lang", "en")
            .with_to_one("post", 1),
        Resource::new(3)
            .with_attribute("title", "Rdza na co dzień")
            .with_attribute("lang", "pl")
            .with_to_one("post", 7),
    ];
    let posts = vec![
        Resource::new(1)
            .with_attribute("title", "Ownership")
            .with_attribute("blog_id", 2)
            .with_attribute("author_id", 1)
            .with_to_many("comments", [1, 2]),
        Resource::new(5)
            .with_attribute("title", "Pinning")
            .with_attribute("blog_id", 1)
            .with_attribute("author_id", 1)
            .with_to_many("comments", [3]),
        Resource::new(7)
            .with_attribute("title", "Makra")
            .with_attribute("blog_id", 3)
            .with_attribute("author_id", 2),
    ];
    let comments = vec![
        Resource::new(1)
            .with_attribute("body", "Great read")
            .with_to_one("post", 1),
        Resource::new(2)
            .with_attribute("body", "Typo in the second listing")
            .with_to_one("post", 1),
        Resource::new(3)
            .with_attribute("body", "Thanks")
            .with_to_one("post", 5),
    ];
    let authors = vec![Resource::new(1)
        .with_attribute("name", "Ferris")
        .with_to_many("blogs", [1, 3])];

    HashMap::from([
        ("blogs".to_string(), blogs),
        ("posts".to_string(), posts),
        ("comments".to_string(), comments),
        ("authors".to_string(), authors),
    ])
}

pub async fn load_seed_data(repository: &InMemoryRepository) -> Result<()> {
    for (collection, rows) in seed_collections() {
        info!("Seeding {} {}", rows.len(), collection);
        for row in rows {
            repository.insert(&collection, row).await;
        }
    }
    Ok(())
}

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

#[cfg(test)]
mod test_support;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ApiError, ErrorKind, ErrorResponse, HandlerError, StorageError, StorageErrorKind};
pub use logic::{ErrorManager, JsonApiHandler, LanguageMatcher, Response, ResponseStatus};

// Export all model types
pub use model::*;

// Export store types
pub use store::{InMemoryRepository, Repository};

use std::sync::Arc;

use crate::config::AppConfig;

/// Engine serving the demo blog models from an in-memory repository.
pub async fn build_handler(config: &AppConfig) -> anyhow::Result<JsonApiHandler> {
    let registry = Arc::new(seed::blog_registry()?);
    let repository = InMemoryRepository::new();
    if config.engine.load_seed_data {
        seed::load_seed_data(&repository).await?;
    }

    let languages = LanguageMatcher::parse(&config.engine.languages)?;
    let mut handler = JsonApiHandler::new(registry.clone(), Arc::new(repository))
        .with_languages(languages)
        .with_default_page_limit(config.engine.default_page_limit);
    for model_handler in seed::blog_model_handlers(&registry)? {
        handler.add_model_handler(model_handler)?;
    }
    Ok(handler)
}

pub fn build_app(handler: JsonApiHandler) -> axum::Router {
    routes::create_router().with_state(Arc::new(handler))
}

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::StorageError;
use crate::logic::{JsonApiHandler, LanguageMatcher};
use crate::model::{Endpoint, EndpointKind, ModelHandler, ModelRegistry, Resource, Scope};
use crate::seed;
use crate::store::{InMemoryRepository, Repository};

/// In-memory repository that records every call as `"<op> <collection>"`.
pub struct RecordingRepository {
    inner: InMemoryRepository,
    calls: Mutex<Vec<String>>,
}

impl RecordingRepository {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Adds a row without recording a call.
    pub async fn insert(&self, collection: &str, resource: Resource) {
        self.inner.insert(collection, resource).await;
    }

    pub fn list_calls(&self, collection: &str) -> usize {
        let call = format!("list {}", collection);
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn record(&self, op: &str, scope: &Scope) {
        self.calls.lock().push(format!("{} {}", op, scope.collection()));
    }
}

#[async_trait::async_trait]
impl Repository for RecordingRepository {
    async fn create(&self, scope: &mut Scope) -> Result<(), StorageError> {
        self.record("create", scope);
        self.inner.create(scope).await
    }

    async fn get(&self, scope: &mut Scope) -> Result<(), StorageError> {
        self.record("get", scope);
        self.inner.get(scope).await
    }

    async fn list(&self, scope: &mut Scope) -> Result<(), StorageError> {
        self.record("list", scope);
        self.inner.list(scope).await
    }

    async fn patch(&self, scope: &mut Scope) -> Result<(), StorageError> {
        self.record("patch", scope);
        self.inner.patch(scope).await
    }

    async fn delete(&self, scope: &mut Scope) -> Result<(), StorageError> {
        self.record("delete", scope);
        self.inner.delete(scope).await
    }
}

pub fn blog_registry() -> ModelRegistry {
    seed::blog_registry().unwrap()
}

/// Engine over the seeded blog rows, with English and Polish supported.
pub fn blog_handler() -> (JsonApiHandler, Arc<RecordingRepository>) {
    blog_handler_with(|_, _| {})
}

/// Like [`blog_handler`], with the seed endpoint rules adjusted by `customize`
/// before they are registered.
pub fn blog_handler_with<F>(customize: F) -> (JsonApiHandler, Arc<RecordingRepository>)
where
    F: FnOnce(&ModelRegistry, &mut Vec<ModelHandler>),
{
    let registry = Arc::new(blog_registry());
    let repo = Arc::new(RecordingRepository::new(InMemoryRepository::with_collections(
        seed::seed_collections(),
    )));
    let languages = LanguageMatcher::parse(&["en".to_string(), "pl".to_string()]).unwrap();

    let mut model_handlers = seed::blog_model_handlers(&registry).unwrap();
    customize(&registry, &mut model_handlers);

    let mut handler = JsonApiHandler::new(registry.clone(), repo.clone()).with_languages(languages);
    for model_handler in model_handlers {
        handler.add_model_handler(model_handler).unwrap();
    }
    (handler, repo)
}

/// Endpoint of `kind` in the handler of `collection`, to attach extra rules.
pub fn endpoint_mut<'a>(
    handlers: &'a mut [ModelHandler],
    collection: &str,
    kind: EndpointKind,
) -> &'a mut Endpoint {
    handlers
        .iter_mut()
        .find(|handler| handler.collection == collection)
        .and_then(|handler| handler.endpoint_mut(kind))
        .unwrap()
}

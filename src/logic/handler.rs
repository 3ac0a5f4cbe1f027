use log::{error, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{
    ApiError, ErrorKind, HandlerError, NoValuesOrigin, StorageError, StorageErrorKind,
};
use crate::logic::{hooks, ErrorManager, LanguageMatcher};
use crate::model::{
    ConfigError, Endpoint, EndpointKind, HookKind, ModelHandler, ModelRegistry, ModelStruct, Scope,
};
use crate::store::Repository;

/// Query-resolution engine. Holds the read-only model registry and endpoint
/// rules plus the storage error map; one instance serves every request.
pub struct JsonApiHandler {
    registry: Arc<ModelRegistry>,
    model_handlers: HashMap<String, ModelHandler>,
    default_repository: Arc<dyn Repository>,
    error_manager: Arc<ErrorManager>,
    languages: LanguageMatcher,
    default_page_limit: Option<usize>,
}

impl JsonApiHandler {
    pub fn new(registry: Arc<ModelRegistry>, default_repository: Arc<dyn Repository>) -> Self {
        Self {
            registry,
            model_handlers: HashMap::new(),
            default_repository,
            error_manager: Arc::new(ErrorManager::new()),
            languages: LanguageMatcher::default(),
            default_page_limit: None,
        }
    }

    pub fn with_error_manager(mut self, error_manager: Arc<ErrorManager>) -> Self {
        self.error_manager = error_manager;
        self
    }

    pub fn with_languages(mut self, languages: LanguageMatcher) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_default_page_limit(mut self, limit: Option<usize>) -> Self {
        self.default_page_limit = limit;
        self
    }

    pub fn add_model_handler(&mut self, handler: ModelHandler) -> Result<(), ConfigError> {
        if self.registry.get(&handler.collection).is_none() {
            return Err(ConfigError::UnknownCollection(handler.collection));
        }
        if self.model_handlers.contains_key(&handler.collection) {
            return Err(ConfigError::DuplicateHandler(handler.collection));
        }
        self.model_handlers
            .insert(handler.collection.clone(), handler);
        Ok(())
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn error_manager(&self) -> &Arc<ErrorManager> {
        &self.error_manager
    }

    pub fn languages(&self) -> &LanguageMatcher {
        &self.languages
    }

    pub(crate) fn default_page_limit(&self) -> Option<usize> {
        self.default_page_limit
    }

    pub fn model(&self, collection: &str) -> Result<Arc<ModelStruct>, ApiError> {
        self.registry.get(collection).ok_or_else(|| {
            ApiError::with_detail(
                ErrorKind::InvalidResourceName,
                format!("unknown collection '{}'", collection),
            )
        })
    }

    pub fn model_handler(&self, collection: &str) -> Option<&ModelHandler> {
        self.model_handlers.get(collection)
    }

    /// The endpoint serving `kind` on `collection`. Operations a model handler
    /// does not expose are forbidden.
    pub fn endpoint(&self, collection: &str, kind: EndpointKind) -> Result<&Endpoint, ApiError> {
        self.model(collection)?;
        self.model_handler(collection)
            .and_then(|handler| handler.endpoint(kind))
            .ok_or_else(|| {
                ApiError::with_detail(
                    ErrorKind::EndpointForbidden,
                    format!("{} is not available for '{}'", kind, collection),
                )
            })
    }

    /// Repository of the model handler, or the default one.
    pub fn repository_for(&self, collection: &str) -> Arc<dyn Repository> {
        self.model_handler(collection)
            .and_then(|handler| handler.repository())
            .unwrap_or_else(|| self.default_repository.clone())
    }

    pub fn manage_storage_error(&self, err: &StorageError) -> ApiError {
        if err.is(StorageErrorKind::Unspecified) || err.is(StorageErrorKind::Internal) {
            error!("Storage failure: {}", err);
        }
        self.error_manager.handle(err)
    }

    /// Turns a pipeline failure into the error the caller sees. Warnings are
    /// logged and let the pipeline continue.
    pub fn handle_handler_error(&self, err: HandlerError) -> Result<(), ApiError> {
        match err {
            HandlerError::Warning(message) => {
                warn!("{}", message);
                Ok(())
            }
            HandlerError::AlreadyWritten(api) => Err(api),
            HandlerError::Storage(storage) => Err(self.manage_storage_error(&storage)),
            HandlerError::NoValues {
                origin: NoValuesOrigin::Preset,
                ..
            } => Err(ApiError::new(ErrorKind::InsufficientAccessPermission)),
            HandlerError::NoValues {
                origin: NoValuesOrigin::Relationship { .. },
                ..
            } => Err(ApiError::new(ErrorKind::ResourceNotFound)),
            HandlerError::ValueNotValid(message) => {
                log::debug!("Precheck value error: {}", message);
                Err(ApiError::with_detail(
                    ErrorKind::InvalidJsonFieldValue,
                    "One of the field values are not valid.",
                ))
            }
            HandlerError::UnsupportedFilter(message) => Err(ApiError::with_detail(
                ErrorKind::UnsupportedFilter,
                message,
            )),
            err @ (HandlerError::Internal(_)
            | HandlerError::ValuePreset(_)
            | HandlerError::NoModel(_)
            | HandlerError::UnsupportedOperator(_)) => {
                error!("{}", err);
                Err(ApiError::internal())
            }
        }
    }

    /// Lists the scope through its repository, wrapped in the read hooks.
    pub(crate) async fn list_with_hooks(&self, scope: &mut Scope) -> Result<(), HandlerError> {
        scope.new_value_many();
        hooks::dispatch(HookKind::BeforeRead, scope)?;
        self.repository_for(scope.collection()).list(scope).await?;
        hooks::dispatch(HookKind::AfterRead, scope)?;
        Ok(())
    }
}

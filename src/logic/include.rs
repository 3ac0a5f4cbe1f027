use log::debug;
use std::future::Future;
use std::pin::Pin;

use crate::error::HandlerError;
use crate::logic::{JsonApiHandler, LanguageTag};
use crate::model::Scope;

type IncludeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

impl JsonApiHandler {
    /// Fetches the related resources of every included field, depth first.
    /// Keys shared by several parents are fetched once. Locale-aware related
    /// collections are restricted to `tag` when one was negotiated.
    pub fn get_included<'a>(
        &'a self,
        scope: &'a mut Scope,
        tag: Option<&'a LanguageTag>,
    ) -> IncludeFuture<'a> {
        Box::pin(async move {
            let result = self.visit_included(scope, tag).await;
            scope.reset_included_cursor();
            result
        })
    }

    async fn visit_included(
        &self,
        scope: &mut Scope,
        tag: Option<&LanguageTag>,
    ) -> Result<(), HandlerError> {
        while scope.next_included_field() {
            let index = scope.current_included_index()?;
            let missing = scope.missing_primaries(index)?;
            if missing.is_empty() {
                debug!(
                    "Nothing to include for {}.{}",
                    scope.collection(),
                    scope.included_fields[index].field.name
                );
                continue;
            }

            let nested = &mut scope.included_fields[index].scope;
            nested.set_id_filters(missing);
            if let Some(tag) = tag {
                if nested.model().use_i18n() {
                    nested.set_language_filter(vec![tag.to_string()])?;
                }
            }

            self.list_with_hooks(nested).await?;
            self.get_included(nested, tag).await?;
        }
        Ok(())
    }
}

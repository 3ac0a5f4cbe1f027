use crate::error::StorageError;
use crate::model::Scope;

/// Storage contract for one resource type. Every call works on a fully
/// resolved scope and writes its result into `scope.value`.
///
/// Implementations never see relationship filters on anything but the
/// related primary key, so no call needs to reach another collection.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Persists the single value. A missing primary key is generated.
    async fn create(&self, scope: &mut Scope) -> Result<(), StorageError>;
    /// Loads the single resource matching the filters, `NoResult` if none does.
    async fn get(&self, scope: &mut Scope) -> Result<(), StorageError>;
    async fn list(&self, scope: &mut Scope) -> Result<(), StorageError>;
    /// Applies the fields set on the single value to the matching resource.
    async fn patch(&self, scope: &mut Scope) -> Result<(), StorageError>;
    async fn delete(&self, scope: &mut Scope) -> Result<(), StorageError>;
}

use log::error;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{ApiError, ErrorKind, StorageError, StorageErrorKind};

/// Maps storage error kinds to user-facing error kinds. Owned by the handler
/// and shared across requests; the map may be swapped or patched at runtime.
#[derive(Debug)]
pub struct ErrorManager {
    map: RwLock<HashMap<StorageErrorKind, ErrorKind>>,
}

impl Default for ErrorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorManager {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(default_error_map()),
        }
    }

    /// Translates a storage error. Kinds with no entry become internal errors
    /// and the gap is logged.
    pub fn handle(&self, err: &StorageError) -> ApiError {
        let kind = self.map.read().get(&err.kind).copied();
        match kind {
            Some(ErrorKind::InternalError) => {
                error!("Storage error mapped to internal error: {}", err);
                ApiError::internal()
            }
            Some(kind) => ApiError::new(kind),
            None => {
                error!(
                    "No error mapping for storage error kind {:?}, extend the error map. Error: {}",
                    err.kind, err
                );
                ApiError::internal()
            }
        }
    }

    /// Replaces the whole mapping.
    pub fn load_custom_map(&self, custom: HashMap<StorageErrorKind, ErrorKind>) {
        *self.map.write() = custom;
    }

    pub fn update_entry(&self, kind: StorageErrorKind, api_kind: ErrorKind) {
        self.map.write().insert(kind, api_kind);
    }

    pub fn lookup(&self, kind: StorageErrorKind) -> Option<ErrorKind> {
        self.map.read().get(&kind).copied()
    }
}

/// Error kinds that are already user-facing map onto themselves.
pub trait MapError {
    fn map_with(self, manager: &ErrorManager) -> ApiError;
}

impl MapError for StorageError {
    fn map_with(self, manager: &ErrorManager) -> ApiError {
        manager.handle(&self)
    }
}

impl MapError for ApiError {
    fn map_with(self, _manager: &ErrorManager) -> ApiError {
        self
    }
}

pub fn default_error_map() -> HashMap<StorageErrorKind, ErrorKind> {
    use StorageErrorKind::*;

    let mut map = HashMap::new();
    map.insert(NoResult, ErrorKind::ResourceNotFound);
    map.insert(UniqueViolation, ErrorKind::ResourceAlreadyExists);
    for kind in [
        DataException,
        IntegrityConstraintViolation,
        RestrictViolation,
        NotNullViolation,
        ForeignKeyViolation,
        CheckViolation,
    ] {
        map.insert(kind, ErrorKind::InvalidInput);
    }
    map.insert(InvalidAuthorization, ErrorKind::InsufficientAccessPermission);
    map.insert(InsufficientPrivilege, ErrorKind::InsufficientAccessPermission);
    for kind in [
        ConnectionException,
        CardinalityViolation,
        InvalidTransactionState,
        InvalidTransactionTermination,
        TransactionRollback,
        TransactionDone,
        InvalidPassword,
        InvalidSchemaName,
        InvalidSyntax,
        InsufficientResources,
        ProgramLimitExceeded,
        SystemError,
        Internal,
        Unspecified,
    ] {
        map.insert(kind, ErrorKind::InternalError);
    }
    map
}

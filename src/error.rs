use serde::Serialize;
use thiserror::Error;

use crate::model::{Operator, ScopeError};

/// User-facing error kinds. Every error that reaches a caller is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    InvalidJsonFieldValue,
    MissingRequiredJsonField,
    InvalidQueryParameter,
    UnsupportedFilter,
    InvalidResourceName,
    InvalidHeaderValue,
    InsufficientAccessPermission,
    EndpointForbidden,
    ResourceNotFound,
    LanguageNotAcceptable,
    ResourceAlreadyExists,
    InternalError,
}

impl ErrorKind {
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput
            | ErrorKind::InvalidJsonFieldValue
            | ErrorKind::MissingRequiredJsonField
            | ErrorKind::InvalidQueryParameter
            | ErrorKind::UnsupportedFilter
            | ErrorKind::InvalidResourceName
            | ErrorKind::InvalidHeaderValue => 400,
            ErrorKind::InsufficientAccessPermission | ErrorKind::EndpointForbidden => 403,
            ErrorKind::ResourceNotFound => 404,
            ErrorKind::LanguageNotAcceptable => 406,
            ErrorKind::ResourceAlreadyExists => 409,
            ErrorKind::InternalError => 500,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "Invalid input",
            ErrorKind::InvalidJsonFieldValue => "Invalid field value",
            ErrorKind::MissingRequiredJsonField => "Missing required field",
            ErrorKind::InvalidQueryParameter => "Invalid query parameter",
            ErrorKind::UnsupportedFilter => "Unsupported filter",
            ErrorKind::InvalidResourceName => "Invalid resource name",
            ErrorKind::InvalidHeaderValue => "Invalid header value",
            ErrorKind::InsufficientAccessPermission => "Insufficient access permission",
            ErrorKind::EndpointForbidden => "Endpoint forbidden",
            ErrorKind::ResourceNotFound => "Resource not found",
            ErrorKind::LanguageNotAcceptable => "Language not acceptable",
            ErrorKind::ResourceAlreadyExists => "Resource already exists",
            ErrorKind::InternalError => "Internal server error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidJsonFieldValue => "invalid_field_value",
            ErrorKind::MissingRequiredJsonField => "missing_required_field",
            ErrorKind::InvalidQueryParameter => "invalid_query_parameter",
            ErrorKind::UnsupportedFilter => "unsupported_filter",
            ErrorKind::InvalidResourceName => "invalid_resource_name",
            ErrorKind::InvalidHeaderValue => "invalid_header_value",
            ErrorKind::InsufficientAccessPermission => "insufficient_access_permission",
            ErrorKind::EndpointForbidden => "endpoint_forbidden",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::LanguageNotAcceptable => "language_not_acceptable",
            ErrorKind::ResourceAlreadyExists => "resource_already_exists",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// A single user-facing error object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", .kind.title(), .detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn internal() -> Self {
        Self::new(ErrorKind::InternalError)
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn to_object(&self) -> ErrorObject {
        ErrorObject {
            status: self.kind.status().to_string(),
            code: self.kind.code(),
            title: self.kind.title(),
            detail: self.detail.clone(),
        }
    }
}

/// Wire shape of an error inside the `errors` array of a document.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    pub status: String,
    pub code: &'static str,
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What an operation returns when it fails. The first error decides the status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{} error(s), first: {}",
    .errors.len(),
    .errors.first().map(|e| e.to_string()).unwrap_or_default()
)]
pub struct ErrorResponse {
    pub errors: Vec<ApiError>,
}

impl ErrorResponse {
    pub fn status(&self) -> u16 {
        self.errors.first().map(|e| e.status()).unwrap_or(400)
    }

    pub fn first_kind(&self) -> Option<ErrorKind> {
        self.errors.first().map(|e| e.kind)
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        Self { errors: vec![err] }
    }
}

impl From<Vec<ApiError>> for ErrorResponse {
    fn from(errors: Vec<ApiError>) -> Self {
        Self { errors }
    }
}

/// Canonical storage error kinds a repository reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    NoResult,
    ConnectionException,
    CardinalityViolation,
    DataException,
    IntegrityConstraintViolation,
    RestrictViolation,
    NotNullViolation,
    ForeignKeyViolation,
    UniqueViolation,
    CheckViolation,
    InvalidTransactionState,
    InvalidTransactionTermination,
    TransactionRollback,
    TransactionDone,
    InvalidAuthorization,
    InvalidPassword,
    InvalidSchemaName,
    InvalidSyntax,
    InsufficientPrivilege,
    InsufficientResources,
    ProgramLimitExceeded,
    SystemError,
    Internal,
    Unspecified,
    /// Repository specific kind with no default mapping.
    Other(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_result(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NoResult, message)
    }

    pub fn is(&self, kind: StorageErrorKind) -> bool {
        self.kind == kind
    }
}

/// Where an empty extraction came from. Relationship misses are reported
/// differently from preset/precheck misses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoValuesOrigin {
    Preset,
    Relationship { collection: String },
}

/// Failures of the resolution pipeline, before they are turned into an [`ApiError`].
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no values ({origin:?}): {message}")]
    NoValues {
        origin: NoValuesOrigin,
        message: String,
    },
    #[error("value not valid: {0}")]
    ValueNotValid(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("cannot preset value: {0}")]
    ValuePreset(String),
    #[error("no model handler for collection '{0}'")]
    NoModel(String),
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),
    #[error("operator '{0}' cannot be used to check values")]
    UnsupportedOperator(Operator),
    #[error("{0}")]
    AlreadyWritten(ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("warning: {0}")]
    Warning(String),
}

impl HandlerError {
    pub fn no_values(message: impl Into<String>) -> Self {
        HandlerError::NoValues {
            origin: NoValuesOrigin::Preset,
            message: message.into(),
        }
    }

    pub fn is_no_values(&self) -> bool {
        matches!(self, HandlerError::NoValues { .. })
    }
}

impl From<ScopeError> for HandlerError {
    fn from(err: ScopeError) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

impl From<ApiError> for HandlerError {
    fn from(err: ApiError) -> Self {
        HandlerError::AlreadyWritten(err)
    }
}

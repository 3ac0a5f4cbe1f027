pub mod crud;
pub mod error_manager;
pub mod handler;
pub mod hooks;
pub mod include;
pub mod language;
pub mod preset;
pub mod relationship_filter;
pub mod validate;

pub use crud::{OperationResult, Response, ResponseStatus};
pub use error_manager::*;
pub use handler::JsonApiHandler;
pub use language::*;
pub use preset::*;
pub use validate::*;

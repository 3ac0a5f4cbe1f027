pub mod endpoint;
pub mod filter;
pub mod hooks;
pub mod preset;
pub mod resource;
pub mod schema;
pub mod scope;

pub use endpoint::*;
pub use filter::*;
pub use hooks::*;
pub use preset::*;
pub use resource::*;
pub use schema::*;
pub use scope::*;

pub mod filter_eval;
pub mod memory;
pub mod traits;

pub use filter_eval::*;
pub use memory::*;
pub use traits::*;

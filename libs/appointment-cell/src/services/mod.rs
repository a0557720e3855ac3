pub mod filter;
pub mod identity;
pub mod memory;
pub mod registry;
pub mod store;

pub use filter::*;
pub use identity::*;
pub use memory::*;
pub use registry::*;
pub use store::*;

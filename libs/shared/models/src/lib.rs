pub mod appointment;
pub mod summary;

pub use appointment::*;
pub use summary::*;

pub mod campaign;
pub mod dispatcher;
pub mod twilio;

pub use campaign::*;
pub use dispatcher::*;
pub use twilio::*;

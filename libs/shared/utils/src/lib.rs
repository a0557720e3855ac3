pub mod retry;
pub mod shared_key;
pub mod test_utils;

pub use retry::RetryPolicy;

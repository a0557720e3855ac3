pub mod blob;
pub mod connection;
pub mod error;
pub mod table;

pub use blob::BlobClient;
pub use connection::StorageAccount;
pub use error::StorageError;
pub use table::TableClient;

//! The relational index (§3, §4.7, §4.10): a derived view over object
//! storage, never the system of record for blob bytes. Every table here can
//! be rebuilt from object storage alone by `vault-rebuild`.

pub mod blob_registry;
pub mod container;
pub mod error;
pub mod models;
pub mod node;
pub mod pool;
pub mod task;

pub use error::IndexError;
pub use pool::connect_and_migrate;

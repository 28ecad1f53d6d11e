//! Test doubles shared across Vault's crates.

pub mod in_memory_storage;

pub use in_memory_storage::InMemoryStorage;

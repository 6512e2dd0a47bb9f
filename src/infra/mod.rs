//! Infrastructure adapters for progress storage.

pub mod store;
pub use store::InMemoryBackend;
pub use store::JsonFileBackend;

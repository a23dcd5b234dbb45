pub mod error;
pub mod memory;
pub mod store;

pub use error::{RepoError, RepoResult};
pub use memory::{EvictionHook, MemoryStore};
pub use store::{EntityStore, Versioned, merge};

//! Versioned cache stores mapping requests to buffered responses.
//!
//! A store is named by the gateway's version tag. Only one store is current
//! at a time; the gateway purges the rest on activation.

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::{state_keys, CacheStorage, CachedResponse, EntrySummary, StoreInfo};

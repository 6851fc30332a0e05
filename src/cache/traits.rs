//! Core traits and record types for the cache store.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::gateway::{Request, Response};

/// A response read back from a store, with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// Method the entry was stored under
  pub method: String,
  /// Absolute URL the entry was stored under
  pub url: String,
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Summary of one named store, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub entry_count: usize,
  /// Sum of body sizes in bytes
  pub total_bytes: u64,
}

/// Summary of one cached entry, without its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
  pub request_key: String,
  pub method: String,
  pub url: String,
  pub status: u16,
  pub kind: String,
  pub size: u64,
  pub cached_at: DateTime<Utc>,
}

/// Gateway bookkeeping keys kept alongside the stores.
pub mod state_keys {
  /// Version whose install phase last completed
  pub const INSTALLED_VERSION: &str = "installed_version";
  /// Version that last completed activation
  pub const ACTIVE_VERSION: &str = "active_version";
}

/// A set of named, versioned request→response stores.
///
/// Writes to a single entry are atomic: a reader sees either the previous
/// response or the new one, never a mix. Concurrent writers to the same key
/// are last-writer-wins.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it does not exist yet.
  fn open_store(&self, store: &str) -> Result<()>;

  /// Names of all stores, sorted.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Delete a store and all of its entries. Returns whether it existed.
  fn delete_store(&self, store: &str) -> Result<bool>;

  /// Look up the entry for exactly this request.
  fn get(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Look up an entry by its storage key.
  fn get_by_key(&self, store: &str, request_key: &str) -> Result<Option<CachedResponse>>;

  /// Write one entry, creating the store if needed.
  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()>;

  /// Write several entries in one transaction: all land or none do.
  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()>;

  fn list_stores(&self) -> Result<Vec<StoreInfo>>;

  /// Entries of a store ordered by URL.
  fn list_entries(&self, store: &str) -> Result<Vec<EntrySummary>>;

  fn get_state(&self, key: &str) -> Result<Option<String>>;

  fn set_state(&self, key: &str, value: &str) -> Result<()>;

  /// Remove every store and all gateway bookkeeping.
  fn clear(&self) -> Result<()>;
}

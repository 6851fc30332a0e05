//! In-process cache storage, used with `--memory` and in tests.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStorage, CachedResponse, EntrySummary, StoreInfo};
use crate::gateway::{Request, Response};

#[derive(Debug, Clone)]
struct Entry {
  method: String,
  url: String,
  response: Response,
  cached_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Store {
  created_at: DateTime<Utc>,
  entries: HashMap<String, Entry>,
}

impl Store {
  fn new() -> Self {
    Self {
      created_at: Utc::now(),
      entries: HashMap::new(),
    }
  }
}

#[derive(Debug, Default)]
struct Inner {
  stores: BTreeMap<String, Store>,
  state: HashMap<String, String>,
}

impl Inner {
  fn insert(&mut self, store: &str, request: &Request, response: &Response) {
    self
      .stores
      .entry(store.to_string())
      .or_insert_with(Store::new)
      .entries
      .insert(
        request.cache_key(),
        Entry {
          method: request.method.to_string(),
          url: request.url.to_string(),
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
  }
}

/// Cache storage held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  inner: Mutex<Inner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
    self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn open_store(&self, store: &str) -> Result<()> {
    self
      .lock()?
      .stores
      .entry(store.to_string())
      .or_insert_with(Store::new);
    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.stores.keys().cloned().collect())
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    Ok(self.lock()?.stores.remove(store).is_some())
  }

  fn get(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    self.get_by_key(store, &request.cache_key())
  }

  fn get_by_key(&self, store: &str, request_key: &str) -> Result<Option<CachedResponse>> {
    let inner = self.lock()?;
    Ok(
      inner
        .stores
        .get(store)
        .and_then(|s| s.entries.get(request_key))
        .map(|e| CachedResponse {
          method: e.method.clone(),
          url: e.url.clone(),
          response: e.response.clone(),
          cached_at: e.cached_at,
        }),
    )
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    self.lock()?.insert(store, request, response);
    Ok(())
  }

  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut inner = self.lock()?;
    for (request, response) in entries {
      inner.insert(store, request, response);
    }
    Ok(())
  }

  fn list_stores(&self) -> Result<Vec<StoreInfo>> {
    let inner = self.lock()?;
    Ok(
      inner
        .stores
        .iter()
        .map(|(name, store)| StoreInfo {
          name: name.clone(),
          created_at: store.created_at,
          entry_count: store.entries.len(),
          total_bytes: store
            .entries
            .values()
            .map(|e| e.response.body.len() as u64)
            .sum(),
        })
        .collect(),
    )
  }

  fn list_entries(&self, store: &str) -> Result<Vec<EntrySummary>> {
    let inner = self.lock()?;
    let mut entries: Vec<EntrySummary> = inner
      .stores
      .get(store)
      .map(|s| {
        s.entries
          .iter()
          .map(|(key, e)| EntrySummary {
            request_key: key.clone(),
            method: e.method.clone(),
            url: e.url.clone(),
            status: e.response.status,
            kind: e.response.kind.as_str().to_string(),
            size: e.response.body.len() as u64,
            cached_at: e.cached_at,
          })
          .collect()
      })
      .unwrap_or_default();
    entries.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(entries)
  }

  fn get_state(&self, key: &str) -> Result<Option<String>> {
    Ok(self.lock()?.state.get(key).cloned())
  }

  fn set_state(&self, key: &str, value: &str) -> Result<()> {
    self
      .lock()?
      .state
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut inner = self.lock()?;
    inner.stores.clear();
    inner.state.clear();
    Ok(())
  }
}

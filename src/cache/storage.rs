//! SQLite cache storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStorage, CachedResponse, EntrySummary, StoreInfo};
use crate::gateway::{Body, Request, Response, ResponseKind};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// A throwaway database that lives only as long as this value.
  #[cfg(test)]
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named (versioned) store
CREATE TABLE IF NOT EXISTS cache_stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Request -> response entries
CREATE TABLE IF NOT EXISTS cache_entries (
    store TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    kind TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, request_key),
    FOREIGN KEY (store) REFERENCES cache_stores(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_url ON cache_entries(store, url);

-- Gateway lifecycle bookkeeping
CREATE TABLE IF NOT EXISTS gateway_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const SELECT_ENTRY: &str = "SELECT method, url, status, kind, headers, body, cached_at
   FROM cache_entries WHERE store = ? AND request_key = ?";

fn insert_entry(
  conn: &Connection,
  store: &str,
  request: &Request,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to create store {}: {}", store, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (store, request_key, method, url, status, kind, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        store,
        request.cache_key(),
        request.method.as_str(),
        request.url.as_str(),
        response.status,
        response.kind.as_str(),
        headers,
        response.body.as_bytes(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", request.url, e))?;

  Ok(())
}

type EntryRow = (String, String, u16, String, String, Vec<u8>, String);

fn read_entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
  ))
}

fn into_cached((method, url, status, kind, headers, body, cached_at): EntryRow) -> Result<CachedResponse> {
  let kind = ResponseKind::parse(&kind).ok_or_else(|| eyre!("Unknown response kind '{}'", kind))?;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

  Ok(CachedResponse {
    method,
    url,
    response: Response {
      status,
      headers,
      kind,
      body: Body::from(body),
    },
    cached_at: parse_datetime(&cached_at)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn open_store(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;
    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read store name: {}", e))?;

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", store, e))?;
    let removed = tx
      .execute("DELETE FROM cache_stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    self.get_by_key(store, &request.cache_key())
  }

  fn get_by_key(&self, store: &str, request_key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(SELECT_ENTRY, params![store, request_key], read_entry_row)
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    row.map(into_cached).transpose()
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, store, request, response)
  }

  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (request, response) in entries {
      insert_entry(&tx, store, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn list_stores(&self) -> Result<Vec<StoreInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT s.name, s.created_at, COUNT(e.request_key), COALESCE(SUM(LENGTH(e.body)), 0)
         FROM cache_stores s
         LEFT JOIN cache_entries e ON e.store = s.name
         GROUP BY s.name
         ORDER BY s.name",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
          row.get::<_, i64>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read store row: {}", e))?;

    rows
      .into_iter()
      .map(|(name, created_at, count, bytes)| {
        Ok(StoreInfo {
          name,
          created_at: parse_datetime(&created_at)?,
          entry_count: count as usize,
          total_bytes: bytes as u64,
        })
      })
      .collect()
  }

  fn list_entries(&self, store: &str) -> Result<Vec<EntrySummary>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT request_key, method, url, status, kind, LENGTH(body), cached_at
         FROM cache_entries WHERE store = ?
         ORDER BY url",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![store], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, u16>(3)?,
          row.get::<_, String>(4)?,
          row.get::<_, i64>(5)?,
          row.get::<_, String>(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list entries of {}: {}", store, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry row: {}", e))?;

    rows
      .into_iter()
      .map(|(request_key, method, url, status, kind, size, cached_at)| {
        Ok(EntrySummary {
          request_key,
          method,
          url,
          status,
          kind,
          size: size as u64,
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }

  fn get_state(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT value FROM gateway_state WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read gateway state {}: {}", key, e))
  }

  fn set_state(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO gateway_state (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write gateway state {}: {}", key, e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(
        "BEGIN;
         DELETE FROM cache_entries;
         DELETE FROM cache_stores;
         DELETE FROM gateway_state;
         COMMIT;",
      )
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

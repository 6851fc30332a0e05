//! Background loading for views.
//!
//! A `Query<T>` runs a loader on the tokio runtime and hands the result back
//! to the UI thread, which polls it on every tick. Views never block the
//! draw loop on storage reads.

use std::future::Future;
use std::pin::Pin;
use tokio::sync::oneshot;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Not started
  Idle,
  Loading,
  Success(T),
  Error(String),
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type LoaderFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Async load with its current state.
pub struct Query<T> {
  state: QueryState<T>,
  loader: LoaderFn<T>,
  receiver: Option<oneshot::Receiver<Result<T, String>>>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a query; the loader runs on every `fetch`/`refetch`.
  pub fn new<F, Fut>(loader: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      loader: Box::new(move || Box::pin(loader())),
      receiver: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    match &self.state {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.state, QueryState::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self.state, QueryState::Error(_))
  }

  /// Start loading unless a load is already running.
  pub fn fetch(&mut self) {
    if self.is_loading() {
      return;
    }
    self.start();
  }

  /// Start a new load, discarding any in flight.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start();
  }

  /// Pick up a finished load. Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.state = match result {
          Ok(data) => QueryState::Success(data),
          Err(e) => QueryState::Error(e),
        };
        self.receiver = None;
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.state = QueryState::Error("Load was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  fn start(&mut self) {
    let (tx, rx) = oneshot::channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.loader)();
    tokio::spawn(async move {
      // Receiver may be gone after a refetch
      let _ = tx.send(future.await);
    });
  }
}

/// Run a synchronous load off the async workers, flattening both error layers.
pub async fn blocking<T, F>(load: F) -> Result<T, String>
where
  F: FnOnce() -> color_eyre::Result<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(load)
    .await
    .map_err(|e| e.to_string())?
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(|| async { Ok::<_, String>(vec!["notes-cache-v1"]) });
    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert_eq!(query.data(), Some(&vec!["notes-cache-v1"]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let mut query: Query<u32> = Query::new(|| async { Err("database locked".to_string()) });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_error());
    assert!(matches!(query.state(), QueryState::Error(e) if e == "database locked"));
  }

  #[tokio::test]
  async fn test_poll_without_fetch_is_noop() {
    let mut query = Query::new(|| async { Ok::<_, String>(1) });
    assert!(!query.poll());
    assert!(matches!(query.state(), QueryState::Idle));
  }

  #[tokio::test]
  async fn test_refetch_replaces_pending_load() {
    let counter = Arc::new(AtomicU32::new(0));
    let loader_counter = counter.clone();

    let mut query = Query::new(move || {
      let counter = loader_counter.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst))
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.refetch();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(query.poll());
    // the first load finished too, but only the second one is observed
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_blocking_load_error_is_stringified() {
    let result: Result<u8, String> =
      blocking(|| Err(color_eyre::eyre::eyre!("no such store"))).await;
    assert_eq!(result, Err("no such store".to_string()));

    assert_eq!(blocking(|| Ok(7u8)).await, Ok(7));
  }
}

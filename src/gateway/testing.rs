//! Scripted network for gateway tests.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::network::Network;
use super::request::Request;
use super::response::{Response, ResponseKind};

/// Network stub answering from a URL → response table.
///
/// Unknown URLs answer 404. URLs marked unreachable, or every URL while
/// offline, fail with a transport error.
#[derive(Default)]
pub struct StubNetwork {
  routes: Mutex<HashMap<String, Response>>,
  unreachable: Mutex<HashSet<String>>,
  offline: AtomicBool,
  latency: Option<Duration>,
  calls: Mutex<Vec<String>>,
}

impl StubNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn route(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn ok(&self, url: &str, body: &str) {
    self.route(url, Response::new(200, ResponseKind::Basic, body));
  }

  pub fn unreachable(&self, url: &str) {
    self.unreachable.lock().unwrap().insert(url.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, url: &str) -> usize {
    self.calls().iter().filter(|u| u.as_str() == url).count()
  }

  async fn respond(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    self.calls.lock().unwrap().push(url.clone());

    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }

    if self.offline.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&url) {
      return Err(eyre!("Failed to fetch {}: network unreachable", url));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&url)
        .cloned()
        .unwrap_or_else(|| Response::new(404, ResponseKind::Basic, "not found")),
    )
  }
}

impl Network for StubNetwork {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(self.respond(request))
  }
}

//! The caching gateway: lifecycle phases and request interception.

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lifecycle::{ActivateReport, InstallReport, WorkerState};
use super::network::Network;
use super::request::Request;
use super::response::Response;
use super::rules::{select_strategy, Rules, Strategy};
use crate::cache::{state_keys, CacheStorage};

/// Where a response handed back by the gateway came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheSource {
  /// Live network response
  Network,
  /// Stored entry for this exact request
  Cache,
  /// Offline navigation served the cached app shell
  AppShell,
  /// Empty response synthesized by the gateway
  Synthesized,
  /// Request was not intercepted
  Passthrough,
}

impl CacheSource {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::AppShell => "app-shell",
      Self::Synthesized => "synthesized",
      Self::Passthrough => "passthrough",
    }
  }
}

/// A response together with its provenance.
#[derive(Debug, Clone)]
pub struct FetchResponse {
  pub response: Response,
  pub source: CacheSource,
}

impl FetchResponse {
  fn new(response: Response, source: CacheSource) -> Self {
    Self { response, source }
  }
}

/// One gateway instance for one version of the app.
///
/// Constructed once at startup with explicit rules, a storage backend and a
/// network client. Lifecycle state is recovered from storage, so a version
/// that was activated by an earlier process keeps controlling requests.
pub struct Gateway {
  rules: Arc<Rules>,
  storage: Arc<dyn CacheStorage>,
  network: Arc<dyn Network>,
  state: Mutex<WorkerState>,
  controlling: AtomicBool,
  /// Background revalidations not yet awaited
  pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
  pub fn new(
    rules: Rules,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Result<Self> {
    let active = storage.get_state(state_keys::ACTIVE_VERSION)?;
    let installed = storage.get_state(state_keys::INSTALLED_VERSION)?;

    let state = if active.as_deref() == Some(rules.version.as_str()) {
      WorkerState::Activated
    } else if installed.as_deref() == Some(rules.version.as_str()) {
      WorkerState::Installed
    } else {
      WorkerState::Parsed
    };
    debug!(version = %rules.version, state = state.label(), "Gateway constructed");

    Ok(Self {
      rules: Arc::new(rules),
      storage,
      network,
      state: Mutex::new(state),
      controlling: AtomicBool::new(state == WorkerState::Activated),
      pending: Mutex::new(Vec::new()),
    })
  }

  pub fn state(&self) -> WorkerState {
    match self.state.lock() {
      Ok(state) => *state,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  /// Whether requests are currently being intercepted.
  pub fn is_controlling(&self) -> bool {
    self.controlling.load(Ordering::SeqCst)
  }

  fn set_state(&self, next: WorkerState) -> Result<WorkerState> {
    let mut state = self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let previous = *state;
    *state = next;
    debug!(from = previous.label(), to = next.label(), "Lifecycle transition");
    Ok(previous)
  }

  // ==================== Install ====================

  /// Populate the current store from the manifests.
  ///
  /// Fails without touching the store if any critical asset cannot be
  /// fetched; secondary assets are best-effort.
  pub async fn install(&self) -> Result<InstallReport> {
    let version = self.rules.version.clone();
    let previous = self.set_state(WorkerState::Installing)?;
    info!(%version, "Installing");

    let critical = match self.fetch_critical().await {
      Ok(entries) => entries,
      Err(e) => {
        self.set_state(previous)?;
        return Err(eyre!("Install of {} failed: {}", version, e));
      }
    };

    if let Err(e) = self
      .storage
      .open_store(&version)
      .and_then(|_| self.storage.put_all(&version, &critical))
    {
      self.set_state(previous)?;
      return Err(eyre!("Install of {} failed: {}", version, e));
    }
    info!(count = critical.len(), "Critical assets cached");

    let (secondary_cached, secondary_failed) = self.cache_secondary().await;

    self
      .storage
      .set_state(state_keys::INSTALLED_VERSION, &version)?;
    // Reinstalling the active version refreshes it in place
    let installed = if self.is_controlling() {
      WorkerState::Activated
    } else {
      WorkerState::Installed
    };
    self.set_state(installed)?;
    info!(%version, secondary_cached, failed = secondary_failed.len(), "Install complete");

    Ok(InstallReport {
      version,
      critical_cached: critical.len(),
      secondary_cached,
      secondary_failed,
      skip_waiting: true,
    })
  }

  /// Fetch every critical asset; all must succeed.
  async fn fetch_critical(&self) -> Result<Vec<(Request, Response)>> {
    let fetches = self.rules.critical_manifest.iter().map(|url| {
      let request = Request::get(url.clone());
      async move {
        let response = self.network.fetch(&request).await?;
        if !response.is_ok() {
          return Err(eyre!(
            "critical asset {} returned status {}",
            request.url,
            response.status
          ));
        }
        Ok::<_, color_eyre::Report>((request, response))
      }
    });

    try_join_all(fetches).await
  }

  /// Cache what we can of the secondary manifest.
  async fn cache_secondary(&self) -> (usize, Vec<String>) {
    let version = self.rules.version.as_str();
    let fetches = self.rules.secondary_manifest.iter().map(|url| {
      let request = Request::get(url.clone());
      async move {
        let outcome = match self.network.fetch(&request).await {
          Ok(response) if !response.is_ok() => {
            Err(eyre!("status {}", response.status))
          }
          Ok(response) if !response.is_storable() => {
            Err(eyre!("{} response cannot be stored", response.kind.as_str()))
          }
          Ok(response) => self.storage.put(version, &request, &response),
          Err(e) => Err(e),
        };
        (request, outcome)
      }
    });

    let mut cached = 0;
    let mut failed = Vec::new();
    for (request, outcome) in join_all(fetches).await {
      match outcome {
        Ok(()) => cached += 1,
        Err(e) => {
          warn!(url = %request.url, error = %e, "Skipping secondary asset");
          failed.push(request.url.to_string());
        }
      }
    }
    (cached, failed)
  }

  // ==================== Activate ====================

  /// Take control and purge every store from other versions.
  pub async fn activate(&self) -> Result<ActivateReport> {
    let version = self.rules.version.clone();
    let installed = self.storage.get_state(state_keys::INSTALLED_VERSION)?;
    if installed.as_deref() != Some(version.as_str()) {
      return Err(eyre!(
        "Cannot activate {}: it has not been installed (installed: {})",
        version,
        installed.as_deref().unwrap_or("none")
      ));
    }

    self.set_state(WorkerState::Activating)?;
    info!(%version, "Activating");

    // Claim: start intercepting right away.
    self.controlling.store(true, Ordering::SeqCst);

    let mut purged = Vec::new();
    for name in self.storage.store_names()? {
      if name != version && self.storage.delete_store(&name)? {
        info!(store = %name, "Deleted old cache store");
        purged.push(name);
      }
    }

    self
      .storage
      .set_state(state_keys::ACTIVE_VERSION, &version)?;
    self.set_state(WorkerState::Activated)?;

    Ok(ActivateReport {
      version,
      claimed: true,
      purged,
    })
  }

  // ==================== Fetch ====================

  /// Intercept a request.
  ///
  /// `Ok(None)` means the request is not intercepted and the caller should
  /// go to the network itself.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Option<FetchResponse>> {
    if !self.is_controlling() {
      debug!(url = %request.url, "Not controlling, passing through");
      return Ok(None);
    }

    let strategy = select_strategy(&self.rules, request);
    debug!(url = %request.url, strategy = strategy.label(), "Routing request");

    let response = match strategy {
      Strategy::Passthrough => return Ok(None),
      Strategy::NetworkFirst => self.network_first(request).await?,
      Strategy::CacheFirst => self.cache_first(request).await?,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await?,
    };
    Ok(Some(response))
  }

  /// Serve a request through the gateway, falling back to a direct network
  /// call when it is not intercepted.
  pub async fn fetch(&self, request: &Request) -> Result<FetchResponse> {
    match self.handle_fetch(request).await? {
      Some(response) => Ok(response),
      None => {
        let response = self.network.fetch(request).await?;
        Ok(FetchResponse::new(response, CacheSource::Passthrough))
      }
    }
  }

  /// Wait for every background revalidation started so far.
  pub async fn wait_until_idle(&self) {
    loop {
      let handles = match self.pending.lock() {
        Ok(mut pending) => std::mem::take(&mut *pending),
        Err(_) => return,
      };
      if handles.is_empty() {
        return;
      }
      for handle in handles {
        if let Err(e) = handle.await {
          warn!(error = %e, "Revalidation task did not complete");
        }
      }
    }
  }

  fn cached(&self, request: &Request) -> Result<Option<Response>> {
    Ok(
      self
        .storage
        .get(&self.rules.version, request)?
        .map(|c| c.response),
    )
  }

  /// Write a response if it is eligible; failures are only logged.
  fn store(&self, request: &Request, response: &Response) {
    if !response.is_storable() {
      debug!(url = %request.url, status = response.status, kind = response.kind.as_str(), "Not storing");
      return;
    }
    if let Err(e) = self.storage.put(&self.rules.version, request, response) {
      warn!(url = %request.url, error = %e, "Cache write failed");
    }
  }

  async fn network_first(&self, request: &Request) -> Result<FetchResponse> {
    match self.network.fetch(request).await {
      Ok(response) => {
        self.store(request, &response);
        Ok(FetchResponse::new(response, CacheSource::Network))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Navigation offline, trying cache");
        match self.cached(request) {
          Ok(Some(response)) => return Ok(FetchResponse::new(response, CacheSource::Cache)),
          Ok(None) => {}
          Err(read_err) => warn!(url = %request.url, error = %read_err, "Cache read failed, trying app shell"),
        }
        let shell = Request::get(self.rules.app_shell.clone());
        if let Some(response) = self.cached(&shell)? {
          info!(url = %request.url, "Serving app shell offline");
          return Ok(FetchResponse::new(response, CacheSource::AppShell));
        }
        Err(e)
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<FetchResponse> {
    if let Some(response) = self.cached(request)? {
      return Ok(FetchResponse::new(response, CacheSource::Cache));
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        self.store(request, &response);
        Ok(FetchResponse::new(response, CacheSource::Network))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Font unavailable, answering 204");
        Ok(FetchResponse::new(
          Response::no_content(),
          CacheSource::Synthesized,
        ))
      }
    }
  }

  async fn stale_while_revalidate(&self, request: &Request) -> Result<FetchResponse> {
    let Some(response) = self.cached(request)? else {
      let response = revalidate(
        Arc::clone(&self.storage),
        Arc::clone(&self.network),
        self.rules.version.clone(),
        request.clone(),
      )
      .await?;
      return Ok(FetchResponse::new(response, CacheSource::Network));
    };

    let storage = Arc::clone(&self.storage);
    let network = Arc::clone(&self.network);
    let version = self.rules.version.clone();
    let request = request.clone();
    let handle = tokio::spawn(async move {
      let url = request.url.clone();
      if let Err(e) = revalidate(storage, network, version, request).await {
        debug!(%url, error = %e, "Background revalidation failed");
      }
    });

    if let Ok(mut pending) = self.pending.lock() {
      pending.retain(|h| !h.is_finished());
      pending.push(handle);
    }

    Ok(FetchResponse::new(response, CacheSource::Cache))
  }
}

/// Fetch a fresh copy and overwrite the stored entry if eligible.
async fn revalidate(
  storage: Arc<dyn CacheStorage>,
  network: Arc<dyn Network>,
  version: String,
  request: Request,
) -> Result<Response> {
  let response = network.fetch(&request).await?;
  if response.is_storable() {
    if let Err(e) = storage.put(&version, &request, &response) {
      warn!(url = %request.url, error = %e, "Revalidation write failed");
    }
  } else {
    debug!(url = %request.url, status = response.status, kind = response.kind.as_str(), "Not storing revalidated response");
  }
  Ok(response)
}

//! Request classification and strategy selection.
//!
//! Everything here is pure: the routing decision for a request depends only
//! on the immutable [`Rules`] and the request itself, so it can be tested
//! without a network or a cache store.

use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::request::Request;
use crate::config::Config;

/// File extensions treated as static assets when served from the origin.
const STATIC_EXTENSIONS: &[&str] = &[
  "css",
  "js",
  "mjs",
  "json",
  "webmanifest",
  "png",
  "jpg",
  "jpeg",
  "gif",
  "svg",
  "ico",
  "webp",
  "woff",
  "woff2",
  "ttf",
  "map",
  "txt",
  "html",
];

/// The five disjoint request categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Auth, realtime database, token and generative endpoints
  ExcludedDynamic,
  /// Full-document load
  Navigation,
  /// Web-font stylesheet or font file
  Font,
  /// Same-origin script, style, image, manifest
  StaticAsset,
  /// Anything else
  Other,
}

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Not intercepted at all
  Passthrough,
  NetworkFirst,
  CacheFirst,
  StaleWhileRevalidate,
}

impl Strategy {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Passthrough => "passthrough",
      Self::NetworkFirst => "network-first",
      Self::CacheFirst => "cache-first",
      Self::StaleWhileRevalidate => "stale-while-revalidate",
    }
  }
}

/// Immutable routing and manifest data for one gateway version.
#[derive(Debug, Clone)]
pub struct Rules {
  /// Version tag naming the current cache store
  pub version: String,
  /// Origin the application is served from
  pub origin: Url,
  /// Same-origin assets that must all be cached at install
  pub critical_manifest: Vec<Url>,
  /// External assets cached on a best-effort basis
  pub secondary_manifest: Vec<Url>,
  /// Document served to offline navigations with no exact match
  pub app_shell: Url,
  /// URL substrings that always go straight to the network
  pub excluded_patterns: Vec<String>,
  /// Host substrings of font providers
  pub font_hosts: Vec<String>,
}

impl Rules {
  /// Resolve manifests and the app shell against the configured origin.
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin_str = config
      .origin
      .as_deref()
      .ok_or_else(|| eyre!("No origin configured. Set `origin` in the config file or pass --origin"))?;
    let origin = Url::parse(origin_str)
      .map_err(|e| eyre!("Invalid origin '{}': {}", origin_str, e))?;
    if !matches!(origin.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be http or https, got '{}'", origin));
    }

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid manifest path '{}': {}", path, e))
    };

    let critical_manifest = config
      .critical_manifest
      .iter()
      .map(|p| resolve(p))
      .collect::<Result<Vec<_>>>()?;

    let secondary_manifest = config
      .secondary_manifest
      .iter()
      .map(|u| Url::parse(u).map_err(|e| eyre!("Invalid secondary asset '{}': {}", u, e)))
      .collect::<Result<Vec<_>>>()?;

    let app_shell = resolve(&config.app_shell)?;

    if config.version.trim().is_empty() {
      return Err(eyre!("Version tag must not be empty"));
    }

    Ok(Self {
      version: config.version.clone(),
      origin,
      critical_manifest,
      secondary_manifest,
      app_shell,
      excluded_patterns: config.excluded_patterns.clone(),
      font_hosts: config.font_hosts.clone(),
    })
  }

  fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  fn is_excluded(&self, url: &Url) -> bool {
    let s = url.as_str();
    self.excluded_patterns.iter().any(|p| s.contains(p.as_str()))
  }

  fn is_font(&self, url: &Url) -> bool {
    url
      .host_str()
      .is_some_and(|host| self.font_hosts.iter().any(|p| host.contains(p.as_str())))
  }

  fn is_static_asset(&self, url: &Url) -> bool {
    if !self.is_same_origin(url) {
      return false;
    }
    if self.critical_manifest.iter().any(|m| m.path() == url.path()) {
      return true;
    }
    url
      .path()
      .rsplit_once('.')
      .map(|(_, ext)| ext.to_ascii_lowercase())
      .is_some_and(|ext| STATIC_EXTENSIONS.contains(&ext.as_str()))
  }
}

/// Place a request in exactly one category.
pub fn classify(rules: &Rules, request: &Request) -> RequestClass {
  if rules.is_excluded(&request.url) {
    RequestClass::ExcludedDynamic
  } else if request.is_navigation() {
    RequestClass::Navigation
  } else if rules.is_font(&request.url) {
    RequestClass::Font
  } else if rules.is_static_asset(&request.url) {
    RequestClass::StaticAsset
  } else {
    RequestClass::Other
  }
}

/// Pick the caching strategy for a request.
pub fn select_strategy(rules: &Rules, request: &Request) -> Strategy {
  if !request.is_interceptable() {
    return Strategy::Passthrough;
  }
  match classify(rules, request) {
    RequestClass::ExcludedDynamic => Strategy::Passthrough,
    RequestClass::Navigation => Strategy::NetworkFirst,
    RequestClass::Font => Strategy::CacheFirst,
    RequestClass::StaticAsset | RequestClass::Other => Strategy::StaleWhileRevalidate,
  }
}

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Gateway configuration.
///
/// Every field has a default matching the notes app deployment, so a config
/// file only needs to set what differs (usually just `origin`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Version tag; bumping it invalidates every previously cached store
  pub version: String,
  /// Origin the app is served from (e.g. "https://notes.example.com")
  pub origin: Option<String>,
  /// Same-origin paths that must all be cached for install to succeed
  pub critical_manifest: Vec<String>,
  /// Absolute external URLs cached on a best-effort basis
  pub secondary_manifest: Vec<String>,
  /// Path of the document served to offline navigations
  pub app_shell: String,
  /// URL substrings of dynamic backends that must never be cached
  pub excluded_patterns: Vec<String>,
  /// Host substrings of font providers
  pub font_hosts: Vec<String>,
  /// Cache database location (defaults to the user data dir)
  pub database: Option<PathBuf>,
  pub network: NetworkConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Connect timeout for the HTTP client; unset leaves the transport default
  pub connect_timeout_secs: Option<u64>,
  /// User-Agent header sent with every request
  pub user_agent: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      version: "notes-cache-v1".to_string(),
      origin: None,
      critical_manifest: ["/", "/index.html", "/style.css", "/script.js", "/manifest.json"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      secondary_manifest: [
        "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
        "https://cdnjs.cloudflare.com/ajax/libs/html2pdf.js/0.10.1/html2pdf.bundle.min.js",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      app_shell: "/index.html".to_string(),
      excluded_patterns: [
        "identitytoolkit.googleapis.com",
        "securetoken.googleapis.com",
        "firebaseio.com",
        "firebasedatabase.app",
        "firestore.googleapis.com",
        "generativelanguage.googleapis.com",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      font_hosts: ["fonts.googleapis.com", "fonts.gstatic.com"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      database: None,
      network: NetworkConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => {
        tracing::debug!(path = %p.display(), "Loading config");
        Self::load_from_path(&p)
      }
      None => {
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Cache database path: configured, or `<data dir>/shellcache/cache.db`.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.database {
      return Ok(path.clone());
    }
    Ok(data_dir()?.join("cache.db"))
  }
}

/// Per-user data directory for the database and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("shellcache"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  /// Log sink shared between the subscriber and the assertions.
  #[derive(Clone, Default)]
  struct Captured(Arc<Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn test_empty_yaml_gives_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.version, "notes-cache-v1");
    assert_eq!(config.app_shell, "/index.html");
    assert_eq!(config.critical_manifest.len(), 5);
    assert!(config.origin.is_none());
  }

  #[test]
  fn test_partial_yaml_overrides_only_given_fields() {
    let yaml = r#"
version: notes-cache-v7
origin: https://notes.example.com
font_hosts: [fonts.bunny.net]
network:
  connect_timeout_secs: 5
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.version, "notes-cache-v7");
    assert_eq!(config.origin.as_deref(), Some("https://notes.example.com"));
    assert_eq!(config.font_hosts, vec!["fonts.bunny.net".to_string()]);
    assert_eq!(config.network.connect_timeout_secs, Some(5));
    // untouched fields keep their defaults
    assert_eq!(config.excluded_patterns.len(), 6);
  }

  #[test]
  fn test_explicit_database_path_wins() {
    let config = Config {
      database: Some(PathBuf::from("/tmp/shellcache-test.db")),
      ..Config::default()
    };
    assert_eq!(
      config.database_path().unwrap(),
      PathBuf::from("/tmp/shellcache-test.db")
    );
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/shellcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_example_config_parses() {
    let config = Config::from_yaml(include_str!("../config.example.yaml")).unwrap();
    let defaults = Config::default();
    assert_eq!(config.origin.as_deref(), Some("https://notes.example.com"));
    assert_eq!(config.critical_manifest, defaults.critical_manifest);
    assert_eq!(config.secondary_manifest, defaults.secondary_manifest);
    assert_eq!(config.excluded_patterns, defaults.excluded_patterns);
  }

  #[test]
  fn test_invalid_yaml_is_an_error() {
    assert!(Config::from_yaml("version: [unterminated").is_err());
  }

  #[test]
  fn test_load_logs_config_source() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::DEBUG)
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .finish();
    let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.yaml"));

    let config = tracing::subscriber::with_default(subscriber, || Config::load(Some(path))).unwrap();

    assert_eq!(config.origin.as_deref(), Some("https://notes.example.com"));
    let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(logged.contains("Loading config"));
    assert!(logged.contains("config.example.yaml"));
  }
}

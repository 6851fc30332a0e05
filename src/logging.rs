//! Tracing setup.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `shellcache=debug`).
const LOG_ENV: &str = "SHELLCACHE_LOG";

fn env_filter(verbose: bool) -> EnvFilter {
  let default = if verbose { "debug" } else { "info" };
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log to stderr; used by the one-shot commands.
pub fn init_stderr(verbose: bool) -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter(verbose))
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}

/// Log to a daily rolling file under `dir`; the terminal belongs to the UI.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init_file(dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "shellcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(verbose))
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

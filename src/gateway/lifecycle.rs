//! Install/activate lifecycle types.

use serde::Serialize;

/// Where the gateway is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  /// Constructed, nothing installed for this version yet
  #[default]
  Parsed,
  /// Install phase running
  Installing,
  /// Install completed, waiting for activation
  Installed,
  /// Activate phase running
  Activating,
  /// Active and controlling requests
  Activated,
}

impl WorkerState {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
    }
  }
}

/// Outcome of a successful install phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
  pub version: String,
  /// Critical assets written to the store
  pub critical_cached: usize,
  /// Secondary assets written to the store
  pub secondary_cached: usize,
  /// Secondary assets that could not be fetched or stored
  pub secondary_failed: Vec<String>,
  /// The new version takes over without waiting for old instances
  pub skip_waiting: bool,
}

/// Outcome of the activate phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
  pub version: String,
  /// The gateway started controlling requests immediately
  pub claimed: bool,
  /// Stores from previous versions that were deleted
  pub purged: Vec<String>,
}

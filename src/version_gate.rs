//! Startup cache version gate.
//!
//! The local store is valid only for the schema generation it was filled
//! under. The generation is recorded in a token kept outside the database (so
//! it survives a purge). On mismatch every partition, the custom topic
//! registry, the cached catalogue and the downloaded-topic markers are purged
//! in one transaction, and only then is the token advanced. A failed purge
//! leaves the token alone so the next start retries.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{error, info, instrument, warn};

use crate::error::GateError;
use crate::store::LocalStore;

/// Schema generation expected by this build. Bump whenever the stored
/// question shape changes.
pub const CONTENT_VERSION: &str = "2024.2-canonical-distractors";

/// Where the out-of-band version token lives.
pub trait VersionTokenStore: Send + Sync {
  fn read(&self) -> std::io::Result<Option<String>>;
  fn write(&self, token: &str) -> std::io::Result<()>;
}

/// Token persisted as a small text file next to the database.
pub struct FileTokenStore {
  path: PathBuf,
}

impl FileTokenStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl VersionTokenStore for FileTokenStore {
  fn read(&self) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(&self.path) {
      Ok(s) => Ok(Some(s.trim().to_string())),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn write(&self, token: &str) -> std::io::Result<()> {
    if let Some(dir) = self.path.parent() {
      std::fs::create_dir_all(dir)?;
    }
    // Write-then-rename; readers never see a partial token.
    let tmp = self.path.with_extension("tmp");
    std::fs::write(&tmp, token)?;
    std::fs::rename(&tmp, &self.path)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
  /// Token matched; nothing touched.
  Current,
  /// Store purged and token advanced.
  Purged { previous: Option<String> },
  /// No usable store; nothing to purge, token left as is.
  StoreUnavailable,
}

/// Run the gate. Must complete before any supplier call.
#[instrument(level = "info", skip(store, tokens))]
pub fn run_version_gate(
  store: &LocalStore,
  tokens: &dyn VersionTokenStore,
  expected: &str,
) -> Result<GateOutcome, GateError> {
  let current = tokens.read()?;
  if current.as_deref() == Some(expected) {
    info!(target: "gate", version = %expected, "Local cache is current");
    return Ok(GateOutcome::Current);
  }

  if !store.is_available() {
    warn!(target: "gate", stored = ?current, %expected, "Version mismatch but local store unavailable; skipping purge");
    return Ok(GateOutcome::StoreUnavailable);
  }

  info!(target: "gate", stored = ?current, %expected, "Content version changed; purging local cache");
  if let Err(e) = store.try_purge_all() {
    error!(target: "gate", error = %e, "Cache purge failed; token not advanced");
    return Err(GateError::Purge(e));
  }
  tokens.write(expected)?;
  info!(target: "gate", version = %expected, "Local cache purged and re-stamped");
  Ok(GateOutcome::Purged { previous: current })
}

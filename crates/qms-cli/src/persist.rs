//! Keeping the signed-in session across invocations.

use std::path::Path;

use anyhow::Context as _;
use qms_remote::{RemoteClient, StoredSession};
use qms_store_sqlite::SqliteIdentityProvider;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

/// A provider whose credentials can be written out and read back.
pub trait Persist {
  type Saved: Serialize + DeserializeOwned;

  fn export(&self) -> Option<Self::Saved>;
  fn restore(&self, saved: Self::Saved);
}

impl Persist for SqliteIdentityProvider {
  type Saved = String;

  fn export(&self) -> Option<String> { self.token() }

  fn restore(&self, token: String) { SqliteIdentityProvider::restore(self, token) }
}

impl Persist for RemoteClient {
  type Saved = StoredSession;

  fn export(&self) -> Option<StoredSession> { self.export_session() }

  fn restore(&self, session: StoredSession) { self.restore_session(session) }
}

/// Restore a saved session if `path` holds one. A corrupt file is ignored.
pub fn load<P: Persist>(provider: &P, path: &Path) -> anyhow::Result<()> {
  let raw = match std::fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(err) => {
      return Err(err).with_context(|| format!("reading session file {}", path.display()));
    }
  };
  match serde_json::from_str(&raw) {
    Ok(saved) => {
      debug!(path = %path.display(), "session restored from disk");
      provider.restore(saved);
    }
    Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable session file"),
  }
  Ok(())
}

/// Write the provider's session to `path`, or remove the file when signed
/// out.
pub fn save<P: Persist>(provider: &P, path: &Path) -> anyhow::Result<()> {
  let Some(saved) = provider.export() else {
    return match std::fs::remove_file(path) {
      Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
        Err(err).with_context(|| format!("removing session file {}", path.display()))
      }
      _ => Ok(()),
    };
  };

  if let Some(dir) = path.parent() {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("creating directory {}", dir.display()))?;
  }
  let json = serde_json::to_string_pretty(&saved).context("serialising session")?;
  std::fs::write(path, json).with_context(|| format!("writing session file {}", path.display()))
}

//! Layered settings: defaults, then `config.toml`, then `QMS_*` variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::ValueEnum;
use qms_remote::RemoteConfig;
use qms_session::SessionConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// The hosted identity service and table API.
  Remote,
  /// A SQLite file on this machine.
  #[default]
  Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
  #[serde(default)]
  pub backend:      BackendKind,
  /// SQLite file used by the local backend and the `local` commands.
  #[serde(default = "default_database")]
  pub database:     PathBuf,
  /// Where the signed-in session is kept between invocations.
  #[serde(default = "default_session_file")]
  pub session_file: PathBuf,
  /// Required when `backend = "remote"`.
  #[serde(default)]
  pub remote:       Option<RemoteConfig>,
  #[serde(default)]
  pub session:      SessionConfig,
}

fn default_database() -> PathBuf { PathBuf::from("~/.local/share/qms/qms.db") }

fn default_session_file() -> PathBuf { PathBuf::from("~/.local/share/qms/session.json") }

impl Settings {
  /// Read `path` (optional) and the environment. Nested keys use a double
  /// underscore, e.g. `QMS_REMOTE__URL` or `QMS_SESSION__IDLE_TIMEOUT_SECS`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("QMS")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Self = raw
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.database = expand_tilde(&settings.database);
    settings.session_file = expand_tilde(&settings.session_file);
    Ok(settings)
  }

  pub fn remote(&self) -> anyhow::Result<&RemoteConfig> {
    self
      .remote
      .as_ref()
      .context("backend is `remote` but no [remote] section (url, api_key) is configured")
  }

  /// The effective settings as TOML, with the API key masked.
  pub fn to_masked_toml(&self) -> anyhow::Result<String> {
    let mut shown = self.clone();
    if let Some(remote) = shown.remote.as_mut() {
      remote.api_key = mask(&remote.api_key);
    }
    toml::to_string_pretty(&shown).context("failed to render settings")
  }
}

fn mask(secret: &str) -> String {
  let visible: String = secret.chars().take(4).collect();
  format!("{visible}…")
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

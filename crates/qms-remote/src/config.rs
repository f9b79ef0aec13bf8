//! Connection settings for the hosted backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
  /// Project base URL, e.g. `https://abc.example.co`.
  pub url:                 String,
  /// Public (anon) API key, sent as the `apikey` header on every request.
  pub api_key:             String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs:        u64,
  /// Refresh the access token this long before it expires.
  #[serde(default = "default_refresh_margin_secs")]
  pub refresh_margin_secs: i64,
}

fn default_timeout_secs() -> u64 { 30 }

fn default_refresh_margin_secs() -> i64 { 60 }

impl RemoteConfig {
  pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      url:                 url.into(),
      api_key:             api_key.into(),
      timeout_secs:        default_timeout_secs(),
      refresh_margin_secs: default_refresh_margin_secs(),
    }
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  pub fn refresh_margin(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.refresh_margin_secs.max(0))
  }

  /// `<url>/<path>` with exactly one slash between them.
  pub(crate) fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.url.trim_end_matches('/'), path.trim_start_matches('/'))
  }
}

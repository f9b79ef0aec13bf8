//! Session lifecycle configuration.

use std::time::Duration;

use qms_core::{permission::PrivilegeOverride, retry::RetryPolicy};
use serde::{Deserialize, Serialize};

/// Tunables for the session lifecycle. Every field has a default, so a
/// partial config file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Absolute session window from context load (default: 86_400 = 24 h).
  pub session_lifetime_secs:    u64,
  /// Period of the background validator (default: 300 = 5 min).
  pub validation_interval_secs: u64,
  /// Token-expired retries before forcing logout (default: 3).
  pub retry_max_attempts:       u32,
  /// Fixed delay before each retry (default: 2000 ms).
  pub retry_delay_ms:           u64,
  /// Pause before `reconnect` re-fetches the session (default: 1000 ms).
  pub reconnect_delay_ms:       u64,
  /// Force logout after this long without activity. `None` or `0` disables
  /// the check (default: 7200 = 2 h).
  pub idle_timeout_secs:        Option<u64>,
  /// Operator-granted admin override. Disabled unless configured.
  pub privilege_override:       PrivilegeOverride,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      session_lifetime_secs:    86_400,
      validation_interval_secs: 300,
      retry_max_attempts:       3,
      retry_delay_ms:           2_000,
      reconnect_delay_ms:       1_000,
      idle_timeout_secs:        Some(7_200),
      privilege_override:       PrivilegeOverride::Disabled,
    }
  }
}

impl SessionConfig {
  pub fn session_lifetime(&self) -> chrono::Duration {
    chrono::Duration::seconds(clamp_secs(self.session_lifetime_secs))
  }

  pub fn validation_interval(&self) -> Duration {
    // `tokio::time::interval` panics on a zero period.
    Duration::from_secs(self.validation_interval_secs.max(1))
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.retry_max_attempts,
      delay:        Duration::from_millis(self.retry_delay_ms),
    }
  }

  pub fn reconnect_delay(&self) -> Duration {
    Duration::from_millis(self.reconnect_delay_ms)
  }

  pub fn idle_timeout(&self) -> Option<chrono::Duration> {
    self
      .idle_timeout_secs
      .filter(|&secs| secs > 0)
      .map(|secs| chrono::Duration::seconds(clamp_secs(secs)))
  }
}

// Keeps `now + lifetime` far away from chrono's overflow panic.
const MAX_SECS: i64 = 100 * 365 * 86_400;

fn clamp_secs(secs: u64) -> i64 { i64::try_from(secs).unwrap_or(MAX_SECS).min(MAX_SECS) }

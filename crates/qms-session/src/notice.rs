//! User-facing notifications emitted by the session layer.

use serde::Serialize;

/// Something the UI should tell the user about.
///
/// `SessionExpired` doubles as the signal to route to the login screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", content = "message", rename_all = "snake_case")]
pub enum Notice {
  SignedIn,
  SignedUp,
  SignedOut,
  SessionExpired,
  Error(String),
}

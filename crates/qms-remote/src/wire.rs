//! Request and response bodies of the auth API, and the persisted session.

use chrono::{DateTime, Duration, TimeZone as _, Utc};
use qms_core::identity::{Identity, SignUpMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Requests ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub(crate) struct PasswordGrant<'a> {
  pub email:    &'a str,
  pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshGrant<'a> {
  pub refresh_token: &'a str,
}

#[derive(Serialize)]
pub(crate) struct SignUpRequest<'a> {
  pub email:    &'a str,
  pub password: &'a str,
  /// Stored by the service as user metadata.
  pub data:     &'a SignUpMetadata,
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserBody {
  pub id:    Uuid,
  #[serde(default)]
  pub email: Option<String>,
}

impl UserBody {
  pub fn into_identity(self) -> Identity {
    Identity {
      id:    self.id,
      email: self.email.unwrap_or_default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
  pub access_token:  String,
  pub refresh_token: String,
  /// Lifetime in seconds.
  pub expires_in:    i64,
  /// Absolute expiry as unix seconds; preferred over `expires_in` if given.
  #[serde(default)]
  pub expires_at:    Option<i64>,
  pub user:          UserBody,
}

impl TokenResponse {
  pub fn into_session(self, now: DateTime<Utc>) -> StoredSession {
    let expires_at = self
      .expires_at
      .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
      .unwrap_or_else(|| now + Duration::seconds(self.expires_in));
    StoredSession {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      expires_at,
      user: self.user.into_identity(),
    }
  }
}

/// Sign-up answers with a full session when no email confirmation is
/// required, and with the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SignUpResponse {
  Session(TokenResponse),
  User(UserBody),
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// The token pair held by [`RemoteClient`](crate::RemoteClient).
///
/// Serializable so callers can persist it between runs and hand it back
/// through [`RemoteClient::restore_session`](crate::RemoteClient::restore_session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
  pub access_token:  String,
  pub refresh_token: String,
  pub expires_at:    DateTime<Utc>,
  pub user:          Identity,
}

impl StoredSession {
  /// True once `now` is within `margin` of the access token's expiry.
  pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
    now + margin >= self.expires_at
  }
}

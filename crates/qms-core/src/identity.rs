//! Identity: the authenticated subject returned by the identity provider.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The authenticated subject. Carries no application data; see
/// [`Profile`](crate::profile::Profile) for that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:    Uuid,
  pub email: String,
}

/// Auth-state changes pushed by an identity provider to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "identity", rename_all = "snake_case")]
pub enum AuthEvent {
  SignedIn(Identity),
  TokenRefreshed(Identity),
  UserUpdated(Identity),
  SignedOut,
}

impl AuthEvent {
  pub fn identity(&self) -> Option<&Identity> {
    match self {
      Self::SignedIn(i) | Self::TokenRefreshed(i) | Self::UserUpdated(i) => Some(i),
      Self::SignedOut => None,
    }
  }
}

/// Extra attributes attached to a sign-up request. Backends use them to seed
/// the new user's profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignUpMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_name:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub company_id: Option<Uuid>,
  /// Anything else the caller wants stored alongside the user.
  #[serde(flatten)]
  pub extra:      serde_json::Map<String, serde_json::Value>,
}

/// Reject obviously unusable credentials before they reach the network.
pub fn validate_credentials(email: &str, password: &str) -> Result<()> {
  if email.trim().is_empty() || password.is_empty() {
    return Err(Error::MissingCredentials);
  }
  if !email.contains('@') {
    return Err(Error::InvalidEmail(email.to_owned()));
  }
  Ok(())
}

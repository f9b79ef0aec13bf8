//! The read-only session snapshot published to UI consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  company::Company, identity::Identity, permission::PermissionSet,
  profile::Profile,
};

/// Whether the session layer has established the current auth state.
///
/// `Connected` also covers "determined that nobody is signed in".
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
  Connected,
  Disconnected,
  #[default]
  Connecting,
}

/// Everything a consumer may read about the current session. Produced as a
/// whole by the lifecycle manager; never partially populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
  pub identity:          Option<Identity>,
  pub profile:           Option<Profile>,
  pub company:           Option<Company>,
  /// True while an auth step is in flight.
  pub loading:           bool,
  pub connection_status: ConnectionStatus,
  pub permissions:       PermissionSet,
  pub session_expiry:    Option<DateTime<Utc>>,
  pub last_activity:     Option<DateTime<Utc>>,
  /// Sticky until the next auth attempt clears it.
  pub has_auth_error:    bool,
}

impl Default for SessionContext {
  fn default() -> Self {
    Self {
      identity:          None,
      profile:           None,
      company:           None,
      loading:           true,
      connection_status: ConnectionStatus::Connecting,
      permissions:       PermissionSet::default(),
      session_expiry:    None,
      last_activity:     None,
      has_auth_error:    false,
    }
  }
}

impl SessionContext {
  /// A user is signed in and their profile has been accepted.
  pub fn is_authenticated(&self) -> bool {
    self.identity.is_some() && self.profile.is_some()
  }
}

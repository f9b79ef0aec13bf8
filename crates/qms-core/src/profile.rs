//! Profile: the tenant-scoped application user record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's application profile. Keyed by the identity id.
///
/// A profile with `is_active == false` must never be attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub id:               Uuid,
  pub email:            String,
  #[serde(default)]
  pub first_name:       Option<String>,
  #[serde(default)]
  pub last_name:        Option<String>,
  /// The company (tenant) this profile belongs to, if any.
  #[serde(default)]
  pub company_id:       Option<Uuid>,
  #[serde(default)]
  pub is_super_admin:   bool,
  #[serde(default)]
  pub is_company_admin: bool,
  #[serde(default)]
  pub is_active:        bool,
  #[serde(default)]
  pub last_login:       Option<DateTime<Utc>>,
}

impl Profile {
  /// "First Last", whichever parts exist, falling back to the email.
  pub fn display_name(&self) -> String {
    let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
      .into_iter()
      .flatten()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .collect();

    if parts.is_empty() {
      self.email.clone()
    } else {
      parts.join(" ")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn profile() -> Profile {
    Profile {
      id:               Uuid::new_v4(),
      email:            "grace@example.com".into(),
      first_name:       None,
      last_name:        None,
      company_id:       None,
      is_super_admin:   false,
      is_company_admin: false,
      is_active:        true,
      last_login:       None,
    }
  }

  #[test]
  fn display_name_falls_back_to_email() {
    let mut p = profile();
    assert_eq!(p.display_name(), "grace@example.com");

    p.first_name = Some("Grace".into());
    assert_eq!(p.display_name(), "Grace");

    p.last_name = Some("Hopper".into());
    assert_eq!(p.display_name(), "Grace Hopper");
  }

  #[test]
  fn missing_flags_deserialise_as_false() {
    let id = Uuid::new_v4();
    let p: Profile = serde_json::from_value(serde_json::json!({
      "id": id,
      "email": "x@example.com",
    }))
    .unwrap();
    assert!(!p.is_active);
    assert!(!p.is_super_admin);
    assert!(p.company_id.is_none());
  }
}

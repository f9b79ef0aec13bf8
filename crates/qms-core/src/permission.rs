//! Role flags derived from a profile.
//!
//! Permissions are never stored. They are recomputed from the current
//! [`Profile`] and the configured [`PrivilegeOverride`] whenever either
//! changes.

use serde::{Deserialize, Serialize};

use crate::profile::Profile;

/// An explicitly configured grant of both admin roles, independent of the
/// profile. Off unless an operator turns it on; callers log every use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PrivilegeOverride {
  #[default]
  Disabled,
  Granted {
    /// Who approved the override; recorded in logs.
    granted_by: String,
    reason:     String,
  },
}

impl PrivilegeOverride {
  pub fn is_active(&self) -> bool { matches!(self, Self::Granted { .. }) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
  pub is_super_admin:   bool,
  pub is_company_admin: bool,
  /// Either of the two roles.
  pub is_admin:         bool,
}

impl PermissionSet {
  pub fn derive(profile: Option<&Profile>, privilege: &PrivilegeOverride) -> Self {
    let granted = privilege.is_active();
    let is_super_admin = granted || profile.is_some_and(|p| p.is_super_admin);
    let is_company_admin = granted || profile.is_some_and(|p| p.is_company_admin);

    Self {
      is_super_admin,
      is_company_admin,
      is_admin: is_super_admin || is_company_admin,
    }
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn profile(super_admin: bool, company_admin: bool) -> Profile {
    Profile {
      id:               Uuid::new_v4(),
      email:            "p@example.com".into(),
      first_name:       None,
      last_name:        None,
      company_id:       None,
      is_super_admin:   super_admin,
      is_company_admin: company_admin,
      is_active:        true,
      last_login:       None,
    }
  }

  fn granted() -> PrivilegeOverride {
    PrivilegeOverride::Granted {
      granted_by: "ops".into(),
      reason:     "preview environment".into(),
    }
  }

  #[test]
  fn override_grants_both_roles() {
    let p = profile(false, false);
    let perms = PermissionSet::derive(Some(&p), &granted());
    assert!(perms.is_super_admin);
    assert!(perms.is_company_admin);
    assert!(perms.is_admin);
  }

  #[test]
  fn without_override_flags_mirror_profile() {
    for (sa, ca) in [(false, false), (true, false), (false, true), (true, true)] {
      let p = profile(sa, ca);
      let perms = PermissionSet::derive(Some(&p), &PrivilegeOverride::Disabled);
      assert_eq!(perms.is_super_admin, sa);
      assert_eq!(perms.is_company_admin, ca);
      assert_eq!(perms.is_admin, sa || ca);
    }
  }

  #[test]
  fn no_profile_means_no_roles() {
    assert_eq!(
      PermissionSet::derive(None, &PrivilegeOverride::Disabled),
      PermissionSet::default()
    );
  }

  #[test]
  fn override_deserialises_from_tagged_form() {
    let o: PrivilegeOverride = serde_json::from_value(serde_json::json!({
      "mode": "granted",
      "granted_by": "ops",
      "reason": "demo",
    }))
    .unwrap();
    assert!(o.is_active());
  }
}

//! Company: the tenant a profile belongs to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organisation using the application. Gates which data and modules a
/// session can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
  pub id:      Uuid,
  pub name:    String,
  #[serde(default)]
  pub slug:    String,
  #[serde(default)]
  pub active:  bool,
  /// Feature modules enabled for this company (e.g. `"audits"`, `"hr"`).
  #[serde(default, alias = "enabled_modules")]
  pub modules: Vec<String>,
}

impl Company {
  pub fn has_module(&self, module: &str) -> bool {
    self.modules.iter().any(|m| m.eq_ignore_ascii_case(module))
  }
}

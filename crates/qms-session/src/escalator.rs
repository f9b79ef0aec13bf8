//! Classification and bounded retry of backend errors.

use std::time::Duration;

use qms_core::{
  Error, ErrorClass,
  retry::{RetryBudget, RetryDecision, RetryPolicy},
};

/// What the manager should do about an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
  /// Re-run `reconnect` after `delay`.
  Retry { attempt: u32, delay: Duration },
  /// Retries are spent; end the session.
  ForceLogout { failures: u32 },
  /// Show the message to the user; the session stays as it is.
  Notify(String),
}

/// Sticky error flag plus the token-expired retry budget.
///
/// Each [`Escalator::clear`] starts a new generation; retries scheduled
/// under an older one are stale.
#[derive(Debug, Clone)]
pub struct Escalator {
  budget:     RetryBudget,
  flagged:    bool,
  generation: u64,
}

impl Escalator {
  pub fn new(policy: RetryPolicy) -> Self {
    Self {
      budget:     RetryBudget::new(policy),
      flagged:    false,
      generation: 0,
    }
  }

  pub fn escalate(&mut self, err: &Error) -> Escalation {
    self.flagged = true;
    match err.class() {
      ErrorClass::TokenExpired => match self.budget.record_failure() {
        RetryDecision::Retry { attempt, delay } => Escalation::Retry { attempt, delay },
        RetryDecision::Exhausted { failures } => Escalation::ForceLogout { failures },
      },
      ErrorClass::Validation | ErrorClass::AccountState | ErrorClass::Other => {
        Escalation::Notify(err.to_string())
      }
    }
  }

  pub fn is_flagged(&self) -> bool { self.flagged }

  pub fn failures(&self) -> u32 { self.budget.failures() }

  pub fn generation(&self) -> u64 { self.generation }

  /// Clear the sticky flag and restore the retry budget.
  pub fn clear(&mut self) {
    self.flagged = false;
    self.budget.reset();
    self.generation = self.generation.wrapping_add(1);
  }
}

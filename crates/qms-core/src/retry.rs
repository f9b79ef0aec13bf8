//! Bounded, fixed-delay retry policy.
//!
//! Kept free of timers so the bound and the delay can be checked without
//! sleeping. The caller decides how to wait.

use std::time::Duration;

/// Maximum attempts and the fixed delay before each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub delay:        Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      delay:        Duration::from_secs(2),
    }
  }
}

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
  /// Try again after `delay`. `attempt` is 1-based.
  Retry { attempt: u32, delay: Duration },
  /// The budget is spent; `failures` counts every failure seen.
  Exhausted { failures: u32 },
}

/// Failure counter against a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryBudget {
  policy:   RetryPolicy,
  failures: u32,
}

impl RetryBudget {
  pub fn new(policy: RetryPolicy) -> Self { Self { policy, failures: 0 } }

  pub fn policy(&self) -> RetryPolicy { self.policy }

  pub fn failures(&self) -> u32 { self.failures }

  /// Record one failure and decide. Once the count exceeds
  /// `max_attempts` every further call returns `Exhausted`.
  pub fn record_failure(&mut self) -> RetryDecision {
    self.failures = self.failures.saturating_add(1);
    if self.failures > self.policy.max_attempts {
      RetryDecision::Exhausted {
        failures: self.failures,
      }
    } else {
      RetryDecision::Retry {
        attempt: self.failures,
        delay:   self.policy.delay,
      }
    }
  }

  pub fn reset(&mut self) { self.failures = 0; }
}

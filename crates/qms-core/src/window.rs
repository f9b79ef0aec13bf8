//! Session window and user activity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Validity interval computed when a user context is loaded.
///
/// `expires_at` is absolute: activity updates `last_activity` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
  pub started_at:    DateTime<Utc>,
  pub expires_at:    DateTime<Utc>,
  pub last_activity: DateTime<Utc>,
}

impl SessionWindow {
  pub fn open(now: DateTime<Utc>, lifetime: Duration) -> Self {
    Self {
      started_at:    now,
      expires_at:    now + lifetime,
      last_activity: now,
    }
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now > self.expires_at }

  pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
    now - self.last_activity
  }

  pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
    self.idle_for(now) > idle_timeout
  }

  /// Stamp activity. Never moves `last_activity` backwards.
  pub fn touch(&mut self, now: DateTime<Utc>) {
    if now > self.last_activity {
      self.last_activity = now;
    }
  }
}

/// The kind of user interaction a host UI reports.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivityKind {
  Pointer,
  Keyboard,
  Scroll,
  Touch,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
      .unwrap()
      .with_timezone(&Utc)
  }

  #[test]
  fn expiry_is_strictly_after_lifetime() {
    let w = SessionWindow::open(t0(), Duration::hours(24));
    assert!(!w.is_expired(t0()));
    assert!(!w.is_expired(t0() + Duration::hours(24)));
    assert!(w.is_expired(t0() + Duration::hours(24) + Duration::seconds(1)));
  }

  #[test]
  fn activity_does_not_extend_expiry() {
    let mut w = SessionWindow::open(t0(), Duration::hours(24));
    w.touch(t0() + Duration::hours(23));
    assert_eq!(w.expires_at, t0() + Duration::hours(24));
    assert_eq!(w.last_activity, t0() + Duration::hours(23));
  }

  #[test]
  fn touch_is_monotonic() {
    let mut w = SessionWindow::open(t0(), Duration::hours(1));
    w.touch(t0() + Duration::minutes(10));
    w.touch(t0() + Duration::minutes(5));
    assert_eq!(w.last_activity, t0() + Duration::minutes(10));
  }

  #[test]
  fn idle_detection() {
    let mut w = SessionWindow::open(t0(), Duration::hours(24));
    let idle = Duration::hours(2);
    assert!(!w.is_idle(t0() + Duration::hours(2), idle));
    assert!(w.is_idle(t0() + Duration::hours(3), idle));

    w.touch(t0() + Duration::hours(2));
    assert!(!w.is_idle(t0() + Duration::hours(3), idle));
  }

  #[test]
  fn activity_kind_parses() {
    assert_eq!("keyboard".parse::<ActivityKind>().unwrap(), ActivityKind::Keyboard);
    assert_eq!(ActivityKind::Touch.to_string(), "touch");
  }
}

//! Lifecycle tests against in-memory mock backends.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use qms_core::{
  Error, ProviderCode, Result,
  backend::{IdentityProvider, ProfileStore, TenantStore},
  clock::ManualClock,
  company::Company,
  context::ConnectionStatus,
  identity::{AuthEvent, Identity, SignUpMetadata},
  permission::PrivilegeOverride,
  profile::Profile,
  window::ActivityKind,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{Notice, SessionConfig, SessionManager, Validity};

// ─── Mocks ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct IdentityState {
  session:         Option<Identity>,
  session_error:   Option<ProviderCode>,
  user_error:      Option<ProviderCode>,
  /// Overrides what `get_user` reports; defaults to the session.
  user:            Option<Option<Identity>>,
  sign_in_error:   Option<ProviderCode>,
  sign_out_error:  Option<ProviderCode>,
  sign_out_delay:  Option<StdDuration>,
  accounts:        HashMap<String, Identity>,
  calls:           Vec<&'static str>,
}

#[derive(Clone)]
struct MockIdentity {
  state:  Arc<Mutex<IdentityState>>,
  events: broadcast::Sender<AuthEvent>,
}

impl MockIdentity {
  fn new() -> Self {
    let (events, _) = broadcast::channel(16);
    Self {
      state: Arc::default(),
      events,
    }
  }

  fn with_session(identity: Identity) -> Self {
    let mock = Self::new();
    mock.state().session = Some(identity);
    mock
  }

  fn state(&self) -> std::sync::MutexGuard<'_, IdentityState> { self.state.lock().unwrap() }

  fn add_account(&self, identity: Identity) {
    self.state().accounts.insert(identity.email.clone(), identity);
  }

  fn calls(&self) -> Vec<&'static str> { self.state().calls.clone() }

  fn count(&self, call: &str) -> usize { self.calls().iter().filter(|c| **c == call).count() }

  fn emit(&self, event: AuthEvent) { let _ = self.events.send(event); }
}

fn fail(code: ProviderCode) -> Error { Error::provider(code, format!("mock {code}")) }

impl IdentityProvider for MockIdentity {
  async fn get_session(&self) -> Result<Option<Identity>> {
    let mut st = self.state();
    st.calls.push("get_session");
    if let Some(code) = st.session_error {
      return Err(fail(code));
    }
    Ok(st.session.clone())
  }

  async fn get_user(&self) -> Result<Option<Identity>> {
    let mut st = self.state();
    st.calls.push("get_user");
    if let Some(code) = st.user_error {
      return Err(fail(code));
    }
    Ok(st.user.clone().unwrap_or_else(|| st.session.clone()))
  }

  async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Identity> {
    let identity = {
      let mut st = self.state();
      st.calls.push("sign_in");
      if let Some(code) = st.sign_in_error {
        return Err(fail(code));
      }
      let identity = st
        .accounts
        .get(email)
        .cloned()
        .ok_or_else(|| fail(ProviderCode::InvalidCredentials))?;
      st.session = Some(identity.clone());
      identity
    };
    self.emit(AuthEvent::SignedIn(identity.clone()));
    Ok(identity)
  }

  async fn sign_up(
    &self,
    email: &str,
    _password: &str,
    _metadata: &SignUpMetadata,
  ) -> Result<Identity> {
    let mut st = self.state();
    st.calls.push("sign_up");
    if st.accounts.contains_key(email) {
      return Err(fail(ProviderCode::UserExists));
    }
    let identity = Identity {
      id:    Uuid::new_v4(),
      email: email.to_owned(),
    };
    st.accounts.insert(email.to_owned(), identity.clone());
    Ok(identity)
  }

  async fn sign_out(&self) -> Result<()> {
    let delay = {
      let mut st = self.state();
      st.calls.push("sign_out");
      st.session = None;
      st.sign_out_delay
    };
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    match self.state().sign_out_error {
      Some(code) => Err(fail(code)),
      None => Ok(()),
    }
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }
}

#[derive(Default)]
struct DirectoryState {
  profiles:      HashMap<Uuid, Profile>,
  companies:     HashMap<Uuid, Company>,
  profile_error: Option<ProviderCode>,
  touch_error:   bool,
  touched:       Vec<(Uuid, DateTime<Utc>)>,
}

/// Profiles and companies. Deliberately returns inactive companies too, so
/// the manager's own filtering is exercised.
#[derive(Clone, Default)]
struct MockDirectory {
  state: Arc<Mutex<DirectoryState>>,
}

impl MockDirectory {
  fn state(&self) -> std::sync::MutexGuard<'_, DirectoryState> { self.state.lock().unwrap() }

  fn add_profile(&self, profile: Profile) { self.state().profiles.insert(profile.id, profile); }

  fn add_company(&self, company: Company) { self.state().companies.insert(company.id, company); }
}

impl ProfileStore for MockDirectory {
  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let st = self.state();
    if let Some(code) = st.profile_error {
      return Err(fail(code));
    }
    Ok(st.profiles.get(&id).cloned())
  }

  async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let mut st = self.state();
    if st.touch_error {
      return Err(fail(ProviderCode::Network));
    }
    st.touched.push((id, at));
    Ok(())
  }
}

impl TenantStore for MockDirectory {
  async fn get_active_company(&self, id: Uuid) -> Result<Option<Company>> {
    Ok(self.state().companies.get(&id).cloned())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

type Manager = SessionManager<MockIdentity, MockDirectory, MockDirectory>;

fn t0() -> DateTime<Utc> {
  DateTime::parse_from_rfc3339("2024-06-03T09:00:00Z")
    .unwrap()
    .with_timezone(&Utc)
}

fn identity(email: &str) -> Identity {
  Identity {
    id:    Uuid::new_v4(),
    email: email.into(),
  }
}

fn profile_for(identity: &Identity, company_id: Option<Uuid>) -> Profile {
  Profile {
    id: identity.id,
    email: identity.email.clone(),
    first_name: Some("Test".into()),
    last_name: Some("User".into()),
    company_id,
    is_super_admin: false,
    is_company_admin: false,
    is_active: true,
    last_login: None,
  }
}

fn company(active: bool) -> Company {
  Company {
    id: Uuid::new_v4(),
    name: "Acme Quality GmbH".into(),
    slug: "acme".into(),
    active,
    modules: vec!["audits".into()],
  }
}

fn manager_with(
  provider: &MockIdentity,
  directory: &MockDirectory,
  config: SessionConfig,
  clock: &ManualClock,
) -> Manager {
  SessionManager::with_clock(
    provider.clone(),
    directory.clone(),
    directory.clone(),
    config,
    clock.clone(),
  )
}

fn manager(provider: &MockIdentity, directory: &MockDirectory, clock: &ManualClock) -> Manager {
  manager_with(provider, directory, SessionConfig::default(), clock)
}

/// A signed-in user with an active profile and company.
fn signed_in_fixture() -> (MockIdentity, MockDirectory, Identity, Company) {
  let user = identity("u1@example.com");
  let company = company(true);
  let provider = MockIdentity::with_session(user.clone());
  provider.add_account(user.clone());
  let directory = MockDirectory::default();
  directory.add_profile(profile_for(&user, Some(company.id)));
  directory.add_company(company.clone());
  (provider, directory, user, company)
}

fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
  let mut out = Vec::new();
  while let Ok(n) = rx.try_recv() {
    out.push(n);
  }
  out
}

// ─── Initialization ──────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_context_for_active_user_and_company() {
  let (provider, directory, user, company) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  m.initialize().await.unwrap();

  let ctx = m.context();
  assert_eq!(ctx.identity.as_ref().map(|i| i.id), Some(user.id));
  assert_eq!(ctx.company.as_ref().map(|c| c.id), Some(company.id));
  assert_eq!(ctx.connection_status, ConnectionStatus::Connected);
  assert!(!ctx.permissions.is_admin);
  assert!(!ctx.loading);
  assert!(!ctx.has_auth_error);
  assert!(ctx.is_authenticated());
  assert_eq!(ctx.session_expiry, Some(t0() + Duration::hours(24)));
}

#[tokio::test]
async fn no_session_is_connected_and_empty() {
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  m.initialize().await.unwrap();

  let ctx = m.context();
  assert!(ctx.identity.is_none());
  assert!(ctx.profile.is_none());
  assert_eq!(ctx.connection_status, ConnectionStatus::Connected);
  assert!(!ctx.loading);
}

#[tokio::test]
async fn inactive_profile_is_rejected_and_state_cleared() {
  let user = identity("inactive@example.com");
  let provider = MockIdentity::with_session(user.clone());
  let directory = MockDirectory::default();
  let mut profile = profile_for(&user, None);
  profile.is_active = false;
  directory.add_profile(profile);

  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();

  let err = m.initialize().await.unwrap_err();
  assert!(matches!(err, Error::ProfileInactive(id) if id == user.id));

  let ctx = m.context();
  assert!(ctx.identity.is_none());
  assert!(ctx.profile.is_none());
  assert!(ctx.has_auth_error);
  assert!(!ctx.loading);
  assert!(matches!(drain(&mut notices).as_slice(), [Notice::Error(_)]));
}

#[tokio::test]
async fn missing_profile_is_an_account_error() {
  let user = identity("ghost@example.com");
  let provider = MockIdentity::with_session(user.clone());
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  let err = m.initialize().await.unwrap_err();
  assert!(matches!(err, Error::ProfileNotFound(_)));
  assert!(m.context().has_auth_error);
  assert!(m.context().profile.is_none());
}

#[tokio::test]
async fn inactive_company_is_dropped_without_error() {
  let user = identity("u2@example.com");
  let inactive = company(false);
  let provider = MockIdentity::with_session(user.clone());
  let directory = MockDirectory::default();
  directory.add_profile(profile_for(&user, Some(inactive.id)));
  directory.add_company(inactive);

  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  let ctx = m.context();
  assert!(ctx.company.is_none());
  assert!(ctx.profile.is_some());
  assert!(!ctx.has_auth_error);
}

#[tokio::test]
async fn missing_company_is_not_an_error() {
  let user = identity("u3@example.com");
  let provider = MockIdentity::with_session(user.clone());
  let directory = MockDirectory::default();
  directory.add_profile(profile_for(&user, Some(Uuid::new_v4())));

  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();
  assert!(m.context().company.is_none());
  assert!(m.context().is_authenticated());
}

#[tokio::test]
async fn generic_error_notifies_without_logout() {
  let user = identity("u4@example.com");
  let provider = MockIdentity::with_session(user.clone());
  let directory = MockDirectory::default();
  directory.state().profile_error = Some(ProviderCode::Network);

  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();

  assert!(m.initialize().await.is_err());
  assert_eq!(m.context().connection_status, ConnectionStatus::Disconnected);
  assert!(m.context().has_auth_error);
  assert_eq!(provider.count("sign_out"), 0);
  assert!(matches!(drain(&mut notices).as_slice(), [Notice::Error(_)]));
}

// ─── Sign in / up / out ──────────────────────────────────────────────────────

#[tokio::test]
async fn sign_in_rejects_malformed_email_before_provider() {
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  let err = m.sign_in("not-an-email", "x").await.unwrap_err();
  assert!(matches!(err, Error::InvalidEmail(_)));
  assert!(provider.calls().is_empty());

  let err = m.sign_in("", "x").await.unwrap_err();
  assert!(matches!(err, Error::MissingCredentials));
  assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn sign_in_loads_context_and_records_login() {
  let (provider, directory, user, company) = signed_in_fixture();
  provider.state().session = None;
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();
  m.initialize().await.unwrap();

  m.sign_in(&user.email, "pw").await.unwrap();

  let ctx = m.context();
  assert_eq!(ctx.identity, Some(user.clone()));
  assert_eq!(ctx.company.map(|c| c.id), Some(company.id));
  assert_eq!(directory.state().touched, vec![(user.id, t0())]);
  assert_eq!(drain(&mut notices), vec![Notice::SignedIn]);
}

#[tokio::test]
async fn last_login_failure_does_not_block_sign_in() {
  let (provider, directory, user, _) = signed_in_fixture();
  directory.state().touch_error = true;
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  m.sign_in(&user.email, "pw").await.unwrap();
  assert!(m.context().is_authenticated());
  assert!(!m.context().has_auth_error);
}

#[tokio::test]
async fn sign_in_clears_previous_auth_error() {
  let (provider, directory, user, _) = signed_in_fixture();
  provider.state().sign_in_error = Some(ProviderCode::InvalidCredentials);
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  assert!(m.sign_in(&user.email, "wrong").await.is_err());
  assert!(m.context().has_auth_error);

  provider.state().sign_in_error = None;
  m.sign_in(&user.email, "right").await.unwrap();
  assert!(!m.context().has_auth_error);
}

#[tokio::test]
async fn sign_up_delegates_with_metadata() {
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();

  let meta = SignUpMetadata {
    first_name: Some("Ada".into()),
    ..Default::default()
  };
  let created = m.sign_up("ada@example.com", "pw", &meta).await.unwrap();
  assert_eq!(created.email, "ada@example.com");
  assert_eq!(drain(&mut notices), vec![Notice::SignedUp]);

  let err = m.sign_up("ada@example.com", "pw", &meta).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Provider {
      code: ProviderCode::UserExists,
      ..
    }
  ));
  assert!(m.context().has_auth_error);
}

#[tokio::test]
async fn sign_out_is_idempotent() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();
  assert!(m.context().is_authenticated());

  m.sign_out().await;
  m.sign_out().await;

  let ctx = m.context();
  assert!(ctx.identity.is_none());
  assert!(ctx.profile.is_none());
  assert!(ctx.company.is_none());
  assert!(ctx.session_expiry.is_none());
  assert_eq!(provider.count("sign_out"), 2);
}

#[tokio::test]
async fn sign_out_clears_state_when_remote_fails() {
  let (provider, directory, _, _) = signed_in_fixture();
  provider.state().sign_out_error = Some(ProviderCode::Network);
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();
  let mut notices = m.notices();

  m.sign_out().await;

  assert!(m.context().identity.is_none());
  let seen = drain(&mut notices);
  assert!(matches!(seen.as_slice(), [Notice::Error(_), Notice::SignedOut]));
}

#[tokio::test]
async fn force_logout_clears_and_announces_expiry() {
  let (provider, directory, _, _) = signed_in_fixture();
  provider.state().sign_out_error = Some(ProviderCode::Network);
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();
  let mut notices = m.notices();

  m.force_logout().await;

  assert!(!m.context().is_authenticated());
  assert_eq!(drain(&mut notices), vec![Notice::SessionExpired]);
}

// ─── Permissions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn privilege_override_grants_admin_flags() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let config = SessionConfig {
    privilege_override: PrivilegeOverride::Granted {
      granted_by: "ops".into(),
      reason:     "preview".into(),
    },
    ..Default::default()
  };
  let m = manager_with(&provider, &directory, config, &clock);
  m.initialize().await.unwrap();

  let perms = m.context().permissions;
  assert!(perms.is_super_admin);
  assert!(perms.is_company_admin);
  assert!(perms.is_admin);
}

#[tokio::test]
async fn permissions_mirror_profile_flags() {
  let (provider, directory, user, _) = signed_in_fixture();
  {
    let mut st = directory.state();
    let p = st.profiles.get_mut(&user.id).unwrap();
    p.is_company_admin = true;
  }
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  let perms = m.context().permissions;
  assert!(!perms.is_super_admin);
  assert!(perms.is_company_admin);
  assert!(perms.is_admin);
}

// ─── Expiry and validation ───────────────────────────────────────────────────

#[tokio::test]
async fn session_expires_only_after_lifetime() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let config = SessionConfig {
    idle_timeout_secs: None,
    ..Default::default()
  };
  let m = manager_with(&provider, &directory, config, &clock);
  m.initialize().await.unwrap();

  assert!(!m.is_session_expired());
  clock.advance(Duration::hours(24));
  assert!(!m.is_session_expired());
  assert_eq!(m.validate_session().await, Validity::Valid);

  clock.advance(Duration::seconds(1));
  assert!(m.is_session_expired());
  assert_eq!(m.validate_session().await, Validity::Expired);
  assert!(m.context().identity.is_none());
}

#[tokio::test]
async fn activity_never_extends_expiry() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  clock.advance(Duration::hours(23));
  m.record_activity(ActivityKind::Keyboard);

  let ctx = m.context();
  assert_eq!(ctx.last_activity, Some(t0() + Duration::hours(23)));
  assert_eq!(ctx.session_expiry, Some(t0() + Duration::hours(24)));
}

#[tokio::test]
async fn activity_without_session_is_ignored() {
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  m.record_activity(ActivityKind::Pointer);
  assert!(m.context().last_activity.is_none());
}

#[tokio::test]
async fn idle_session_is_logged_out() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  clock.advance(Duration::minutes(90));
  m.record_activity(ActivityKind::Scroll);
  clock.advance(Duration::minutes(90));
  assert_eq!(m.validate_session().await, Validity::Valid);

  clock.advance(Duration::minutes(31));
  assert_eq!(m.validate_session().await, Validity::Idle);
  assert!(m.context().identity.is_none());
}

#[tokio::test]
async fn validate_without_user_forces_logout() {
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();

  assert_eq!(m.validate_session().await, Validity::NoSession);
  assert_eq!(drain(&mut notices), vec![Notice::SessionExpired]);
  assert_eq!(provider.count("get_user"), 0);
}

#[tokio::test]
async fn provider_rejection_forces_logout() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  provider.state().user_error = Some(ProviderCode::TokenExpired);
  assert_eq!(m.validate_session().await, Validity::Rejected);
  assert!(m.context().identity.is_none());
  assert_eq!(provider.count("sign_out"), 1);
}

#[tokio::test]
async fn provider_reporting_another_user_is_rejected() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  provider.state().user = Some(Some(identity("intruder@example.com")));
  assert_eq!(m.validate_session().await, Validity::Rejected);
}

// ─── Background tasks (paused time) ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fourth_token_expiry_forces_logout_instead_of_retrying() {
  let user = identity("u5@example.com");
  let provider = MockIdentity::with_session(user);
  provider.state().session_error = Some(ProviderCode::TokenExpired);
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();
  let _supervisor = m.start();

  assert!(m.initialize().await.is_err());
  tokio::time::sleep(StdDuration::from_secs(60)).await;

  assert_eq!(provider.count("get_session"), 4);
  assert_eq!(provider.count("sign_out"), 1);
  let seen = drain(&mut notices);
  assert_eq!(seen, vec![Notice::SessionExpired]);
  assert!(m.context().has_auth_error);
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_when_token_becomes_valid() {
  let (provider, directory, user, _) = signed_in_fixture();
  provider.state().session_error = Some(ProviderCode::TokenExpired);
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let _supervisor = m.start();

  assert!(m.initialize().await.is_err());
  provider.state().session_error = None;
  tokio::time::sleep(StdDuration::from_secs(10)).await;

  let ctx = m.context();
  assert_eq!(ctx.identity.map(|i| i.id), Some(user.id));
  assert_eq!(ctx.connection_status, ConnectionStatus::Connected);
  assert_eq!(provider.count("sign_out"), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_retries() {
  let user = identity("u6@example.com");
  let provider = MockIdentity::with_session(user);
  provider.state().session_error = Some(ProviderCode::TokenExpired);
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let supervisor = m.start();

  assert!(m.initialize().await.is_err());
  supervisor.shutdown();
  tokio::time::sleep(StdDuration::from_secs(60)).await;

  assert_eq!(provider.count("get_session"), 1);
}

#[tokio::test(start_paused = true)]
async fn validator_stops_after_first_failure() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let config = SessionConfig {
    idle_timeout_secs: None,
    ..Default::default()
  };
  let m = manager_with(&provider, &directory, config, &clock);
  let _supervisor = m.start();
  m.initialize().await.unwrap();

  tokio::time::sleep(StdDuration::from_secs(301)).await;
  assert_eq!(provider.count("get_user"), 1);
  assert!(m.context().is_authenticated());

  provider.state().user = Some(None);
  tokio::time::sleep(StdDuration::from_secs(300)).await;
  assert_eq!(provider.count("get_user"), 2);
  assert!(m.context().identity.is_none());

  tokio::time::sleep(StdDuration::from_secs(1_500)).await;
  assert_eq!(provider.count("get_user"), 2);
}

#[tokio::test(start_paused = true)]
async fn validator_disabled_under_privilege_override() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let config = SessionConfig {
    privilege_override: PrivilegeOverride::Granted {
      granted_by: "ops".into(),
      reason:     "demo".into(),
    },
    ..Default::default()
  };
  let m = manager_with(&provider, &directory, config, &clock);
  let _supervisor = m.start();
  m.initialize().await.unwrap();

  tokio::time::sleep(StdDuration::from_secs(3_600)).await;
  assert_eq!(provider.count("get_user"), 0);
}

#[tokio::test(start_paused = true)]
async fn auth_events_before_initialize_are_dropped() {
  let user = identity("u7@example.com");
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  directory.add_profile(profile_for(&user, None));
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let _supervisor = m.start();

  provider.emit(AuthEvent::SignedIn(user.clone()));
  tokio::time::sleep(StdDuration::from_millis(10)).await;
  assert!(m.context().identity.is_none());

  m.initialize().await.unwrap();
  provider.emit(AuthEvent::SignedIn(user.clone()));
  tokio::time::sleep(StdDuration::from_millis(10)).await;
  assert_eq!(m.context().identity, Some(user));
}

#[tokio::test(start_paused = true)]
async fn provider_sign_out_event_clears_context() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let _supervisor = m.start();
  m.initialize().await.unwrap();
  assert!(m.context().is_authenticated());

  provider.emit(AuthEvent::SignedOut);
  tokio::time::sleep(StdDuration::from_millis(10)).await;
  assert!(m.context().identity.is_none());
  assert_eq!(m.context().connection_status, ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_without_session_disconnects() {
  let (provider, directory, _, _) = signed_in_fixture();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  provider.state().session = None;
  m.reconnect().await.unwrap();

  let ctx = m.context();
  assert!(ctx.identity.is_none());
  assert_eq!(ctx.connection_status, ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn token_expiry_retries_inline_without_worker() {
  let user = identity("u8@example.com");
  let provider = MockIdentity::with_session(user);
  provider.state().session_error = Some(ProviderCode::TokenExpired);
  let directory = MockDirectory::default();
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let mut notices = m.notices();

  assert!(m.initialize().await.is_err());

  assert_eq!(provider.count("get_session"), 4);
  assert_eq!(provider.count("sign_out"), 1);
  assert_eq!(drain(&mut notices), vec![Notice::SessionExpired]);
  assert!(m.context().identity.is_none());
}

#[tokio::test(start_paused = true)]
async fn inline_retry_recovers_once_token_is_valid() {
  let (provider, directory, user, _) = signed_in_fixture();
  provider.state().session_error = Some(ProviderCode::TokenExpired);
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);

  let pending = tokio::spawn({
    let m = m.clone();
    async move { m.initialize().await }
  });
  tokio::time::sleep(StdDuration::from_millis(500)).await;
  provider.state().session_error = None;
  assert!(pending.await.unwrap().is_err());

  let ctx = m.context();
  assert_eq!(ctx.identity.map(|i| i.id), Some(user.id));
  assert_eq!(ctx.connection_status, ConnectionStatus::Connected);
  assert_eq!(provider.count("get_session"), 2);
  assert_eq!(provider.count("sign_out"), 0);
}

#[tokio::test(start_paused = true)]
async fn sign_in_supersedes_pending_retry() {
  let (provider, directory, user, _) = signed_in_fixture();
  provider.state().session_error = Some(ProviderCode::TokenExpired);
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let _supervisor = m.start();

  assert!(m.initialize().await.is_err());
  provider.state().session_error = None;
  m.sign_in("u1@example.com", "pw").await.unwrap();
  let mut context = m.subscribe();
  let _ = context.borrow_and_update();

  tokio::time::sleep(StdDuration::from_secs(10)).await;
  assert_eq!(provider.count("get_session"), 1);
  assert!(!context.has_changed().unwrap());
  assert_eq!(m.context().identity.map(|i| i.id), Some(user.id));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_event_listener() {
  let user = identity("u9@example.com");
  let provider = MockIdentity::new();
  let directory = MockDirectory::default();
  directory.add_profile(profile_for(&user, None));
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  let supervisor = m.start();
  m.initialize().await.unwrap();

  supervisor.shutdown();
  provider.emit(AuthEvent::SignedIn(user));
  tokio::time::sleep(StdDuration::from_millis(10)).await;
  assert!(m.context().identity.is_none());
}

#[tokio::test(start_paused = true)]
async fn loading_while_remote_sign_out_is_pending() {
  let (provider, directory, user, _) = signed_in_fixture();
  provider.state().sign_out_delay = Some(StdDuration::from_secs(5));
  let clock = ManualClock::new(t0());
  let m = manager(&provider, &directory, &clock);
  m.initialize().await.unwrap();

  let pending = tokio::spawn({
    let m = m.clone();
    async move { m.sign_out().await }
  });
  tokio::time::sleep(StdDuration::from_secs(1)).await;
  assert!(m.context().loading);
  pending.await.unwrap();
  assert!(!m.context().loading);
  assert!(m.context().identity.is_none());

  provider.state().session = Some(user);
  m.initialize().await.unwrap();
  assert!(m.context().is_authenticated());
  let pending = tokio::spawn({
    let m = m.clone();
    async move { m.force_logout().await }
  });
  tokio::time::sleep(StdDuration::from_secs(1)).await;
  assert!(m.context().loading);
  assert!(m.context().identity.is_none());
  pending.await.unwrap();
  assert!(!m.context().loading);
}

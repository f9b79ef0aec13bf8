//! Session and authorization lifecycle for QMS.
//!
//! [`SessionManager`] is the single owner of "who is signed in, for which
//! company, with which permissions". It is generic over the backend traits in
//! [`qms_core::backend`] and publishes immutable [`SessionContext`] snapshots
//! through a `watch` channel.
//!
//! ```rust,ignore
//! let manager = SessionManager::new(provider, profiles, companies, config);
//! let _supervisor = manager.start();
//! manager.initialize().await?;
//! let ctx = manager.context();
//! ```
//!
//! [`SessionContext`]: qms_core::context::SessionContext

mod activity;
mod escalator;
mod manager;
mod tasks;
mod validator;

pub mod config;
pub mod notice;

pub use config::SessionConfig;
pub use escalator::{Escalation, Escalator};
pub use manager::SessionManager;
pub use notice::Notice;
pub use tasks::Supervisor;
pub use validator::Validity;

#[cfg(test)]
mod tests;

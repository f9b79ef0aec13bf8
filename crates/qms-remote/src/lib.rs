//! HTTP backend for the hosted identity service and table API.
//!
//! [`RemoteClient`] implements all three backend traits from
//! [`qms_core::backend`]. It speaks the GoTrue-style auth dialect under
//! `/auth/v1` and the PostgREST-style table dialect under `/rest/v1`, and
//! keeps the access/refresh token pair in memory.

mod client;
mod tables;
mod wire;

pub mod config;
pub mod error;

pub use client::RemoteClient;
pub use config::RemoteConfig;
pub use error::{Error, Result};
pub use wire::StoredSession;

//! SQLite backend for the QMS session layer.
//!
//! Implements the identity provider, profile store and tenant store traits
//! from [`qms_core::backend`] on a single SQLite file. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod provider;
mod schema;
mod store;
mod token;

pub mod error;

pub use error::{Error, Result};
pub use provider::SqliteIdentityProvider;
pub use store::{NewCompany, SqliteStore};

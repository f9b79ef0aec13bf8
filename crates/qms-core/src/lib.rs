//! Core types and trait definitions for QMS session management.
//!
//! This crate is free of HTTP and database dependencies. Backends
//! (`qms-store-sqlite`, `qms-remote`) implement its traits and the lifecycle
//! manager in `qms-session` consumes them.

// Native `async fn` in traits; the returned futures are declared `Send`.
#![allow(async_fn_in_trait)]

pub mod backend;
pub mod clock;
pub mod company;
pub mod context;
pub mod error;
pub mod identity;
pub mod permission;
pub mod profile;
pub mod retry;
pub mod window;

pub use error::{Error, ErrorClass, ProviderCode, Result};

//! # Newsdesk Shared Library
//!
//! The authentication and session core of the newsdesk CMS backend, shared by
//! the API server and its tests.
//!
//! ## Module Organization
//!
//! - `auth`: password hashing, session tokens, request middleware, role gates
//! - `account`: login, registration and password change flows
//! - `store`: the identity store boundary and its implementations
//! - `models`: database models (users and roles)
//! - `db`: connection pool and migrations

pub mod account;
pub mod auth;
pub mod db;
pub mod models;
pub mod store;

/// Current version of the newsdesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Database layer
//!
//! - `pool`: PostgreSQL connection pool with a health check
//! - `migrations`: embedded schema migrations for the `users` table
//!
//! Row types and their queries live in [`crate::models`]; the auth core only
//! reaches them through [`crate::store::UserStore`].

pub mod migrations;
pub mod pool;

//! Database models
//!
//! - `user`: accounts and editorial roles

pub mod user;

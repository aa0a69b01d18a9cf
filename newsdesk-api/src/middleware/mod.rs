//! Middleware modules for the API server
//!
//! Authentication lives in `newsdesk_shared::auth::middleware`; this module
//! only holds HTTP hardening that is specific to the server.

pub mod security;

//! API route handlers
//!
//! This module contains all route handlers organized by resource:
//!
//! - `health`: Health check endpoint
//! - `auth`: Session endpoints (login, register, refresh, logout, me, change password)
//! - `gated`: Role-gated pings, session status and the staff dashboard

pub mod auth;
pub mod gated;
pub mod health;

//! Domain models for the Keystone auth core.
//!
//! These are the core types shared across all crates.

pub mod mfa;
pub mod refresh_token;
pub mod user;

//! Keystone Core — domain models, repository traits, and shared errors
//! for the authentication and session core.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{CoreError, CoreResult};

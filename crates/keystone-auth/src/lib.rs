//! Keystone Auth — credential verification, brute-force lockout, MFA
//! (TOTP/SMS/email + backup codes), and token issuance/rotation.

pub mod config;
pub mod delivery;
pub mod error;
pub mod lockout;
pub mod mfa;
pub mod otp;
pub mod password;
pub mod service;
pub mod sessions;
pub mod token;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use service::{AuthService, LoginOutcome, TokenPair};
pub use sessions::SessionRegistry;
pub use token::AccessTokenClaims;

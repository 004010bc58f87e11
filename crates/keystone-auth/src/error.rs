//! Authentication error types.
//!
//! Business-rule failures are typed variants returned to the caller;
//! only store failures (`Store`) represent infrastructure problems.
//!
//! Display strings are what an HTTP layer may show to users: they never
//! say which of identifier/password was wrong, and the token-theft and
//! token-reuse variants render the same generic message as a plainly
//! invalid token. The variants stay distinct for security logging.

use keystone_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("username or email already in use")]
    DuplicateUser,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked; retry in {retry_after_secs} seconds")]
    Locked { retry_after_secs: u64 },

    #[error("invalid MFA code")]
    MfaInvalidCode,

    #[error("MFA code has expired")]
    MfaCodeExpired,

    #[error("MFA is not set up for this account")]
    MfaNotEnrolled,

    #[error("current password does not match")]
    CurrentPasswordMismatch,

    #[error("password was used recently")]
    PasswordReused,

    #[error("new password is the same as the current one")]
    SameAsCurrent,

    #[error("token is no longer valid; please log in again")]
    TokenInvalid,

    #[error("token is no longer valid; please log in again")]
    TokenExpired,

    /// An already-rotated token was presented again.
    #[error("token is no longer valid; please log in again")]
    TokenReused,

    /// Rotation from an unexpected IP; every session was revoked.
    #[error("token is no longer valid; please log in again")]
    TokenIpMismatch,

    #[error("not authorized for this session")]
    Unauthorized,

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("store unavailable: {0}")]
    Store(#[from] CoreError),
}

pub type AuthResult<T> = Result<T, AuthError>;

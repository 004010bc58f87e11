//! Password hashing and verification using Argon2id.
//!
//! Cost parameters come from [`AuthConfig`]; verification reads the
//! parameters embedded in the stored PHC string, so hashes produced
//! under older settings keep verifying after a config change.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

use crate::config::AuthConfig;
use crate::error::AuthError;

const OUTPUT_LEN: usize = 64;

fn hasher(config: &AuthConfig) -> Result<Argon2<'static>, AuthError> {
    let params = argon2::Params::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
        Some(OUTPUT_LEN),
    )
    .map_err(|e| AuthError::Crypto(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

fn peppered<'a>(password: &'a str, pepper: Option<&str>, buf: &'a mut String) -> &'a [u8] {
    match pepper {
        Some(p) => {
            *buf = format!("{p}{password}");
            buf.as_bytes()
        }
        None => password.as_bytes(),
    }
}

/// Hash a plaintext password into a PHC-format Argon2id string.
///
/// The salt is randomly generated per call. Never panics on odd input;
/// failures surface as `AuthError::Crypto`.
pub fn hash_password(password: &str, config: &AuthConfig) -> Result<String, AuthError> {
    let mut buf = String::new();
    let input = peppered(password, config.pepper.as_deref(), &mut buf);

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = hasher(config)?
        .hash_password(input, &salt)
        .map_err(|e| AuthError::Crypto(format!("password hash: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC-format hash.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch, or
/// `Err(AuthError::Crypto)` if the stored hash is malformed — stored
/// hashes are long-lived, so a corrupt one must not crash callers.
pub fn verify_password(
    password: &str,
    hash: &str,
    config: &AuthConfig,
) -> Result<bool, AuthError> {
    let mut buf = String::new();
    let input = peppered(password, config.pepper.as_deref(), &mut buf);

    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

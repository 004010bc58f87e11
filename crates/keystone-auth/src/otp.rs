//! One-time credentials: TOTP enrollment/verification, AES-256-GCM
//! sealing of TOTP secrets at rest, and generation of the numeric
//! SMS/email codes and hex backup codes.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

/// Seal a TOTP secret with AES-256-GCM.
///
/// Returns `base64(nonce || ciphertext || tag)`.
pub fn seal_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

/// Open an AES-256-GCM sealed TOTP secret.
pub fn open_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() < 13 {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

fn totp_instance(
    secret_bytes: Vec<u8>,
    issuer: &str,
    account: &str,
) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1, // RFC 6238 default
        6,               // digits
        1,               // skew (one step either side)
        30,              // step seconds
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

/// Generate a TOTP enrollment: raw secret bytes + otpauth URI.
///
/// The caller seals the secret before storing it.
pub fn new_totp_enrollment(
    issuer: &str,
    account: &str,
) -> Result<(Vec<u8>, String), AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))?;

    let totp = totp_instance(secret_bytes.clone(), issuer, account)?;
    Ok((secret_bytes, totp.get_url()))
}

/// Check a submitted TOTP code against the raw secret, with the
/// standard time-step algorithm.
pub fn check_totp(
    secret_bytes: &[u8],
    code: &str,
    issuer: &str,
    account: &str,
) -> Result<bool, AuthError> {
    let totp = totp_instance(secret_bytes.to_vec(), issuer, account)?;
    totp.check_current(code)
        .map_err(|e| AuthError::Crypto(format!("TOTP check: {e}")))
}

/// Random 6-digit numeric code for SMS/email delivery.
pub fn numeric_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

/// Random 8-hex-char backup code.
pub fn backup_code() -> String {
    let mut rng = rand::rng();
    format!("{:08x}", rng.random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [42u8; 32];
        let plaintext = b"totp-secret-bytes";
        let sealed = seal_secret(&key, plaintext).unwrap();
        assert_eq!(open_secret(&key, &sealed).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails_open() {
        let sealed = seal_secret(&[42u8; 32], b"secret").unwrap();
        assert!(open_secret(&[99u8; 32], &sealed).is_err());
    }

    #[test]
    fn enrollment_produces_valid_uri() {
        let (secret, uri) = new_totp_enrollment("Keystone", "alice@example.com").unwrap();
        assert!(!secret.is_empty());
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Keystone"));
        assert!(uri.contains("alice"));
    }

    #[test]
    fn check_totp_with_current_code() {
        let (secret, _) = new_totp_enrollment("Keystone", "t@t.com").unwrap();
        let totp = totp_instance(secret.clone(), "Keystone", "t@t.com").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(check_totp(&secret, &code, "Keystone", "t@t.com").unwrap());
    }

    #[test]
    fn check_totp_wrong_code() {
        let (secret, _) = new_totp_enrollment("Keystone", "t@t.com").unwrap();
        assert!(!check_totp(&secret, "000000", "Keystone", "t@t.com").unwrap());
    }

    #[test]
    fn numeric_code_is_six_digits() {
        for _ in 0..32 {
            let code = numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn backup_code_is_eight_hex_chars() {
        let code = backup_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

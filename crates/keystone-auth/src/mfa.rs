//! MFA state machine.
//!
//! Pure transitions over [`MfaState`] — callers persist the returned
//! state. Keeping the transitions free of storage makes every path
//! (wrong code, expired code, backup-code flip) directly testable.
//!
//! MFA verification failures deliberately do not touch the login
//! lockout counter.

use chrono::{DateTime, Duration, Utc};
use keystone_core::models::mfa::{BackupCode, MfaMethod, MfaState};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::otp;

/// An out-of-band code that must be handed to the delivery channel.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub destination: String,
    pub code: String,
}

/// Result of starting an enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentStart {
    pub state: MfaState,
    /// otpauth URI for authenticator apps (TOTP only).
    pub provisioning_uri: Option<String>,
    /// Code to deliver out-of-band (SMS/email only).
    pub delivery: Option<Delivery>,
}

fn totp_key(config: &AuthConfig) -> Result<&[u8; 32], AuthError> {
    config
        .mfa_encryption_key
        .as_ref()
        .ok_or_else(|| AuthError::Crypto("MFA encryption key not configured".into()))
}

fn code_is_fresh(issued_at: DateTime<Utc>, now: DateTime<Utc>, config: &AuthConfig) -> bool {
    now - issued_at <= Duration::seconds(config.otp_lifetime_secs as i64)
}

/// Start enrolling a second factor. The account stays non-MFA until
/// the pending secret is confirmed with [`complete_enrollment`].
///
/// `destination` is the phone number for SMS; email defaults to the
/// account's address.
pub fn begin_enrollment(
    config: &AuthConfig,
    method: MfaMethod,
    account_email: &str,
    destination: Option<String>,
    now: DateTime<Utc>,
) -> Result<EnrollmentStart, AuthError> {
    match method {
        MfaMethod::Totp => {
            let key = totp_key(config)?;
            let (secret_bytes, uri) = otp::new_totp_enrollment(&config.totp_issuer, account_email)?;
            let sealed = otp::seal_secret(key, &secret_bytes)?;
            Ok(EnrollmentStart {
                state: MfaState::PendingSetup {
                    method,
                    secret: sealed,
                    destination: None,
                    issued_at: now,
                },
                provisioning_uri: Some(uri),
                delivery: None,
            })
        }
        MfaMethod::Sms | MfaMethod::Email => {
            let destination = match destination {
                Some(dest) => dest,
                None if method == MfaMethod::Email => account_email.to_string(),
                None => {
                    return Err(AuthError::Validation(
                        "a phone number is required for SMS enrollment".into(),
                    ));
                }
            };
            let code = otp::numeric_code();
            Ok(EnrollmentStart {
                state: MfaState::PendingSetup {
                    method,
                    secret: code.clone(),
                    destination: Some(destination.clone()),
                    issued_at: now,
                },
                provisioning_uri: None,
                delivery: Some(Delivery { destination, code }),
            })
        }
    }
}

/// Confirm a pending enrollment with a code from the new factor.
///
/// On success the factor becomes enabled and the freshly generated
/// backup codes are returned in plain form — this is the only time
/// they are visible. Verifying with no pending setup is an error.
pub fn complete_enrollment(
    config: &AuthConfig,
    state: &MfaState,
    code: &str,
    account_email: &str,
    now: DateTime<Utc>,
) -> Result<(MfaState, Vec<String>), AuthError> {
    let MfaState::PendingSetup {
        method,
        secret,
        destination,
        issued_at,
    } = state
    else {
        return Err(AuthError::MfaNotEnrolled);
    };

    match method {
        MfaMethod::Totp => {
            let key = totp_key(config)?;
            let secret_bytes = otp::open_secret(key, secret)?;
            if !otp::check_totp(&secret_bytes, code, &config.totp_issuer, account_email)? {
                return Err(AuthError::MfaInvalidCode);
            }
        }
        MfaMethod::Sms | MfaMethod::Email => {
            if !code_is_fresh(*issued_at, now, config) {
                return Err(AuthError::MfaCodeExpired);
            }
            if code != secret {
                return Err(AuthError::MfaInvalidCode);
            }
        }
    }

    let plain: Vec<String> = (0..config.backup_code_count)
        .map(|_| otp::backup_code())
        .collect();
    let backup_codes = plain
        .iter()
        .map(|code| BackupCode {
            code: code.clone(),
            used: false,
        })
        .collect();

    let enabled = MfaState::Enabled {
        method: *method,
        // The confirmed SMS/email code is spent; a fresh one is issued
        // per login by `challenge`.
        secret: match method {
            MfaMethod::Totp => secret.clone(),
            _ => otp::numeric_code(),
        },
        destination: destination.clone(),
        backup_codes,
        code_issued_at: None,
    };

    Ok((enabled, plain))
}

/// Prepare the login challenge for an MFA-enabled account.
///
/// TOTP needs nothing sent; SMS/email get a fresh one-time code. The
/// returned state (when present) must be persisted before the caller
/// reports `MfaRequired`.
pub fn challenge(
    config: &AuthConfig,
    state: &MfaState,
    now: DateTime<Utc>,
) -> Result<(Option<MfaState>, Option<Delivery>), AuthError> {
    let MfaState::Enabled {
        method,
        destination,
        backup_codes,
        ..
    } = state
    else {
        return Err(AuthError::MfaNotEnrolled);
    };

    match method {
        MfaMethod::Totp => Ok((None, None)),
        MfaMethod::Sms | MfaMethod::Email => {
            let destination = destination
                .clone()
                .ok_or_else(|| AuthError::Validation("MFA delivery address missing".into()))?;
            let code = otp::numeric_code();
            let next = MfaState::Enabled {
                method: *method,
                secret: code.clone(),
                destination: Some(destination.clone()),
                backup_codes: backup_codes.clone(),
                code_issued_at: Some(now),
            };
            Ok((Some(next), Some(Delivery { destination, code })))
        }
    }
}

/// Check a login-time code (method code or backup code) and return the
/// updated state.
///
/// A backup code must exactly match an unused entry; the match flips
/// it used, irreversibly. A successful SMS/email check replaces the
/// stored code with a fresh undelivered value so it cannot be
/// replayed.
pub fn verify_login(
    config: &AuthConfig,
    state: &MfaState,
    code: &str,
    account_email: &str,
    now: DateTime<Utc>,
) -> Result<MfaState, AuthError> {
    let MfaState::Enabled {
        method,
        secret,
        destination,
        backup_codes,
        code_issued_at,
    } = state
    else {
        return Err(AuthError::MfaNotEnrolled);
    };

    // Backup codes first: exact match against an unused entry.
    if let Some(pos) = backup_codes
        .iter()
        .position(|b| !b.used && b.code == code)
    {
        let mut codes = backup_codes.clone();
        codes[pos].used = true;
        return Ok(MfaState::Enabled {
            method: *method,
            secret: secret.clone(),
            destination: destination.clone(),
            backup_codes: codes,
            code_issued_at: *code_issued_at,
        });
    }

    match method {
        MfaMethod::Totp => {
            let key = totp_key(config)?;
            let secret_bytes = otp::open_secret(key, secret)?;
            if !otp::check_totp(&secret_bytes, code, &config.totp_issuer, account_email)? {
                return Err(AuthError::MfaInvalidCode);
            }
            Ok(state.clone())
        }
        MfaMethod::Sms | MfaMethod::Email => {
            let issued_at = code_issued_at.ok_or(AuthError::MfaInvalidCode)?;
            if !code_is_fresh(issued_at, now, config) {
                return Err(AuthError::MfaCodeExpired);
            }
            if code != secret {
                return Err(AuthError::MfaInvalidCode);
            }
            Ok(MfaState::Enabled {
                method: *method,
                secret: otp::numeric_code(),
                destination: destination.clone(),
                backup_codes: backup_codes.clone(),
                code_issued_at: None,
            })
        }
    }
}

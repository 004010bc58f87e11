//! Multi-factor authentication state.
//!
//! One tagged enum per user instead of loose `mfa_enabled` /
//! `mfa_secret` columns: the meaning of `secret` depends on the state
//! (sealed TOTP secret vs. a pending one-time code), so the states are
//! kept apart at the type level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    Totp,
    Sms,
    Email,
}

impl MfaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaMethod::Totp => "totp",
            MfaMethod::Sms => "sms",
            MfaMethod::Email => "email",
        }
    }
}

/// One-shot recovery credential. `used` flips false→true exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCode {
    pub code: String,
    pub used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MfaState {
    Disabled,
    /// `setup` was called but the factor is not yet verified.
    ///
    /// For TOTP, `secret` is the sealed shared secret; for SMS/email it
    /// is the pending 6-digit code and `destination` is where it went.
    PendingSetup {
        method: MfaMethod,
        secret: String,
        destination: Option<String>,
        issued_at: DateTime<Utc>,
    },
    Enabled {
        method: MfaMethod,
        secret: String,
        destination: Option<String>,
        backup_codes: Vec<BackupCode>,
        /// When the current SMS/email login code was issued; `None`
        /// means no deliverable code is outstanding.
        code_issued_at: Option<DateTime<Utc>>,
    },
}

impl MfaState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, MfaState::Enabled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tag_roundtrip() {
        let state = MfaState::PendingSetup {
            method: MfaMethod::Sms,
            secret: "123456".into(),
            destination: Some("+15550100".into()),
            issued_at: Utc::now(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "pending_setup");
        assert_eq!(json["method"], "sms");
        let back: MfaState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn disabled_is_not_enabled() {
        assert!(!MfaState::Disabled.is_enabled());
    }
}

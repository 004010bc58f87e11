//! Refresh token domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a refresh token stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationReason {
    Rotation,
    Logout,
    SecurityIpMismatch,
    PasswordChange,
    Manual,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Rotation => "rotation",
            RevocationReason::Logout => "logout",
            RevocationReason::SecurityIpMismatch => "security-ip-mismatch",
            RevocationReason::PasswordChange => "password-change",
            RevocationReason::Manual => "manual",
        }
    }
}

/// A stored refresh token. The raw opaque value is never persisted;
/// `token_hash` is its SHA-256 digest and the lookup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_to_ip: String,
    pub expires_at: DateTime<Utc>,
    /// Flipped true exactly once — at rotation, logout, password
    /// change, or theft response. Never cleared.
    pub is_revoked: bool,
    pub revoked_reason: Option<RevocationReason>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_to_ip: String,
    pub expires_at: DateTime<Utc>,
}

/// Read view of an active session for the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub ip: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&RefreshToken> for SessionInfo {
    fn from(token: &RefreshToken) -> Self {
        Self {
            id: token.id,
            ip: token.issued_to_ip.clone(),
            issued_at: token.created_at,
            expires_at: token.expires_at,
        }
    }
}

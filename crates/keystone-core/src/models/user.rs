//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::mfa::MfaState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Stored lowercase so lookups are case-insensitive.
    pub email: String,
    pub password_hash: String,
    /// Up to the configured number of previous hashes, oldest first.
    pub password_history: Vec<String>,
    pub password_changed_at: DateTime<Utc>,
    pub failed_login_attempts: u32,
    /// While `now < locked_until`, every login attempt is rejected
    /// before the password hasher runs.
    pub locked_until: Option<DateTime<Utc>>,
    pub mfa: MfaState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Remaining lock time in whole seconds, if the account is locked.
    pub fn lock_remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        match self.locked_until {
            Some(until) if until > now => Some((until - now).num_seconds().max(1) as u64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    /// Already hashed — the service hashes before it ever reaches a store.
    pub password_hash: String,
}

/// Lockout policy as data, so a store can apply it inside the same
/// transaction that increments the failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutSchedule {
    /// Counts below this never lock.
    pub free_attempts: u32,
    /// Counts at or above this get the hard lock.
    pub hard_attempts: u32,
    /// Lock seconds for counts `free_attempts..hard_attempts`, in order.
    pub step_lock_secs: Vec<u64>,
    pub hard_lock_secs: u64,
}

/// Partial update; `Some(None)` on a nested option clears the field.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub password_hash: Option<String>,
    pub password_history: Option<Vec<String>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: Option<u32>,
    pub locked_until: Option<Option<DateTime<Utc>>>,
    pub mfa: Option<MfaState>,
}

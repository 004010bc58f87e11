//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations must provide
//! read-modify-write atomicity per record: `record_login_failure` is a
//! single atomic increment, and `consume` flips the revocation flag for
//! at most one caller under concurrent invocation.

use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::refresh_token::{CreateRefreshToken, RefreshToken, RevocationReason};
use crate::models::user::{CreateUser, LockoutSchedule, UpdateUser, User};

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = CoreResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<User>> + Send;
    fn get_by_username(&self, username: &str) -> impl Future<Output = CoreResult<User>> + Send;
    /// Lookup by lowercase email (callers normalize).
    fn get_by_email(&self, email: &str) -> impl Future<Output = CoreResult<User>> + Send;
    fn update(&self, id: Uuid, input: UpdateUser) -> impl Future<Output = CoreResult<User>> + Send;

    /// Atomically increment the failed-login counter and, when the new
    /// count reaches the schedule, set `locked_until` in the same store
    /// transaction. The two writes commit together or not at all, even
    /// when the caller is cancelled mid-flight; two concurrent calls
    /// never lose an update. Returns the updated user.
    fn record_login_failure(
        &self,
        id: Uuid,
        schedule: &LockoutSchedule,
    ) -> impl Future<Output = CoreResult<User>> + Send;

    /// Reset the counter to zero and clear any lock.
    fn clear_login_failures(&self, id: Uuid) -> impl Future<Output = CoreResult<()>> + Send;
}

pub trait RefreshTokenRepository: Send + Sync {
    fn create(
        &self,
        input: CreateRefreshToken,
    ) -> impl Future<Output = CoreResult<RefreshToken>> + Send;

    /// Fetch by hash regardless of revocation state — callers need
    /// revoked records to tell reuse apart from an unknown token.
    fn get_by_hash(&self, token_hash: &str)
    -> impl Future<Output = CoreResult<RefreshToken>> + Send;

    /// Revoke the token iff it is currently unrevoked. Returns the
    /// token when this call performed the flip, `None` when another
    /// caller got there first (or the token does not exist). This is
    /// the single-use guarantee for rotation.
    fn consume(
        &self,
        token_hash: &str,
        reason: RevocationReason,
    ) -> impl Future<Output = CoreResult<Option<RefreshToken>>> + Send;

    /// Revoke one token by id, enforcing ownership in the predicate.
    /// Returns `false` when no matching unrevoked token exists.
    fn revoke(
        &self,
        user_id: Uuid,
        token_id: Uuid,
        reason: RevocationReason,
    ) -> impl Future<Output = CoreResult<bool>> + Send;

    /// Revoke every unrevoked token of a user; returns how many.
    fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
    ) -> impl Future<Output = CoreResult<u64>> + Send;

    /// Unrevoked, unexpired tokens only.
    fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<RefreshToken>>> + Send;

    /// Physically delete tokens past `expires_at`; returns how many.
    fn cleanup_expired(&self) -> impl Future<Output = CoreResult<u64>> + Send;
}

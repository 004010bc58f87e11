//! Session registry — a read/revoke view over a user's refresh tokens.

use keystone_core::models::refresh_token::{RevocationReason, SessionInfo};
use keystone_core::repository::RefreshTokenRepository;
use tracing::info;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

pub struct SessionRegistry<R: RefreshTokenRepository> {
    tokens: R,
}

impl<R: RefreshTokenRepository> SessionRegistry<R> {
    pub fn new(tokens: R) -> Self {
        Self { tokens }
    }

    /// Active sessions only: unrevoked and unexpired.
    pub async fn list_active(&self, user_id: Uuid) -> AuthResult<Vec<SessionInfo>> {
        let tokens = self.tokens.list_active_for_user(user_id).await?;
        Ok(tokens.iter().map(SessionInfo::from).collect())
    }

    /// Revoke a single session. Ownership is enforced in the store
    /// predicate, so revoking another user's session and revoking a
    /// nonexistent one are indistinguishable — both `Unauthorized`.
    pub async fn revoke_one(&self, user_id: Uuid, token_id: Uuid) -> AuthResult<()> {
        let revoked = self
            .tokens
            .revoke(user_id, token_id, RevocationReason::Manual)
            .await?;
        if !revoked {
            return Err(AuthError::Unauthorized);
        }
        info!(%user_id, %token_id, "session revoked");
        Ok(())
    }

    /// "Log out everywhere"; also used by password change and theft
    /// detection (with their own reasons).
    pub async fn revoke_all(&self, user_id: Uuid, reason: RevocationReason) -> AuthResult<u64> {
        let revoked = self.tokens.revoke_all_for_user(user_id, reason).await?;
        info!(%user_id, revoked, reason = reason.as_str(), "sessions revoked");
        Ok(revoked)
    }
}

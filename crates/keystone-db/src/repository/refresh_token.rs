//! SurrealDB implementation of [`RefreshTokenRepository`].
//!
//! Single-use consumption is a conditional update: the `WHERE
//! is_revoked = false` predicate makes the flip a compare-and-set, so
//! exactly one of two racing callers gets the row back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use keystone_core::CoreResult;
use keystone_core::models::refresh_token::{CreateRefreshToken, RefreshToken, RevocationReason};
use keystone_core::repository::RefreshTokenRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::bounded;

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct TokenRowWithId {
    record_id: String,
    user_id: String,
    token_hash: String,
    issued_to_ip: String,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    revoked_reason: Option<String>,
    created_at: DateTime<Utc>,
}

const ROW_FIELDS: &str = "meta::id(id) AS record_id, user_id, token_hash, \
    issued_to_ip, expires_at, is_revoked, revoked_reason, created_at";

fn parse_reason(raw: &str) -> Result<RevocationReason, DbError> {
    match raw {
        "rotation" => Ok(RevocationReason::Rotation),
        "logout" => Ok(RevocationReason::Logout),
        "security-ip-mismatch" => Ok(RevocationReason::SecurityIpMismatch),
        "password-change" => Ok(RevocationReason::PasswordChange),
        "manual" => Ok(RevocationReason::Manual),
        other => Err(DbError::Decode(format!(
            "unknown revocation reason: {other}"
        ))),
    }
}

impl TokenRowWithId {
    fn try_into_token(self) -> Result<RefreshToken, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid UUID: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| DbError::Decode(format!("invalid UUID: {e}")))?;
        let revoked_reason = match self.revoked_reason.as_deref() {
            Some(raw) => Some(parse_reason(raw)?),
            None => None,
        };
        Ok(RefreshToken {
            id,
            user_id,
            token_hash: self.token_hash,
            issued_to_ip: self.issued_to_ip,
            expires_at: self.expires_at,
            is_revoked: self.is_revoked,
            revoked_reason,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the refresh token repository.
#[derive(Clone)]
pub struct SurrealRefreshTokenRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealRefreshTokenRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(db: Surreal<C>, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

impl<C: Connection> RefreshTokenRepository for SurrealRefreshTokenRepository<C> {
    async fn create(&self, input: CreateRefreshToken) -> CoreResult<RefreshToken> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let query = format!(
                "CREATE type::record('refresh_token', $id) SET \
                 user_id = $user_id, token_hash = $token_hash, \
                 issued_to_ip = $issued_to_ip, expires_at = $expires_at, \
                 is_revoked = false, revoked_reason = NONE \
                 RETURN {ROW_FIELDS}"
            );

            let result = db
                .query(&query)
                .bind(("id", id_str.clone()))
                .bind(("user_id", input.user_id.to_string()))
                .bind(("token_hash", input.token_hash))
                .bind(("issued_to_ip", input.issued_to_ip))
                .bind(("expires_at", input.expires_at))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::Migration(e.to_string()))?;

            let rows: Vec<TokenRowWithId> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "refresh_token".into(),
                id: id_str,
            })
        })
        .await?;

        Ok(row.try_into_token()?)
    }

    async fn get_by_hash(&self, token_hash: &str) -> CoreResult<RefreshToken> {
        let token_hash = token_hash.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let query = format!(
                "SELECT {ROW_FIELDS} FROM refresh_token \
                 WHERE token_hash = $token_hash"
            );

            let mut result = db
                .query(&query)
                .bind(("token_hash", token_hash))
                .await?;

            let rows: Vec<TokenRowWithId> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "refresh_token".into(),
                id: "token_hash".into(),
            })
        })
        .await?;

        Ok(row.try_into_token()?)
    }

    async fn consume(
        &self,
        token_hash: &str,
        reason: RevocationReason,
    ) -> CoreResult<Option<RefreshToken>> {
        let token_hash = token_hash.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let query = format!(
                "UPDATE refresh_token SET \
                 is_revoked = true, revoked_reason = $reason \
                 WHERE token_hash = $token_hash AND is_revoked = false \
                 RETURN {ROW_FIELDS}"
            );

            let mut result = db
                .query(&query)
                .bind(("token_hash", token_hash))
                .bind(("reason", reason.as_str().to_string()))
                .await?;

            let rows: Vec<TokenRowWithId> = result.take(0)?;
            Ok(rows.into_iter().next())
        })
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_into_token()?)),
            None => Ok(None),
        }
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        token_id: Uuid,
        reason: RevocationReason,
    ) -> CoreResult<bool> {
        let db = self.db.clone();
        let token_id_str = token_id.to_string();

        let flipped = bounded(self.timeout, async move {
            // Ownership lives in the predicate so a caller can never
            // revoke another user's session.
            let query = format!(
                "UPDATE type::record('refresh_token', $id) SET \
                 is_revoked = true, revoked_reason = $reason \
                 WHERE user_id = $user_id AND is_revoked = false \
                 RETURN {ROW_FIELDS}"
            );

            let mut result = db
                .query(&query)
                .bind(("id", token_id_str))
                .bind(("user_id", user_id.to_string()))
                .bind(("reason", reason.as_str().to_string()))
                .await?;

            let rows: Vec<TokenRowWithId> = result.take(0)?;
            Ok(!rows.is_empty())
        })
        .await?;

        Ok(flipped)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
    ) -> CoreResult<u64> {
        let db = self.db.clone();

        let count = bounded(self.timeout, async move {
            let query = format!(
                "UPDATE refresh_token SET \
                 is_revoked = true, revoked_reason = $reason \
                 WHERE user_id = $user_id AND is_revoked = false \
                 RETURN {ROW_FIELDS}"
            );

            let mut result = db
                .query(&query)
                .bind(("user_id", user_id.to_string()))
                .bind(("reason", reason.as_str().to_string()))
                .await?;

            let rows: Vec<TokenRowWithId> = result.take(0)?;
            Ok(rows.len() as u64)
        })
        .await?;

        Ok(count)
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> CoreResult<Vec<RefreshToken>> {
        let db = self.db.clone();

        let rows = bounded(self.timeout, async move {
            let query = format!(
                "SELECT {ROW_FIELDS} FROM refresh_token \
                 WHERE user_id = $user_id AND is_revoked = false \
                 AND expires_at > time::now() \
                 ORDER BY created_at"
            );

            let mut result = db
                .query(&query)
                .bind(("user_id", user_id.to_string()))
                .await?;

            let rows: Vec<TokenRowWithId> = result.take(0)?;
            Ok(rows)
        })
        .await?;

        let mut tokens = Vec::with_capacity(rows.len());
        for row in rows {
            tokens.push(row.try_into_token()?);
        }
        Ok(tokens)
    }

    async fn cleanup_expired(&self) -> CoreResult<u64> {
        let db = self.db.clone();

        let count = bounded(self.timeout, async move {
            // Count expired tokens first, then delete.
            let mut count_result = db
                .query(
                    "SELECT count() AS total FROM refresh_token \
                     WHERE expires_at <= time::now() GROUP ALL",
                )
                .await?;
            let count_rows: Vec<CountRow> = count_result.take(0)?;
            let total = count_rows.first().map(|r| r.total).unwrap_or(0);

            db.query("DELETE refresh_token WHERE expires_at <= time::now()")
                .await?;

            Ok(total)
        })
        .await?;

        Ok(count)
    }
}

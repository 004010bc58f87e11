//! SurrealDB implementation of [`UserRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use keystone_core::CoreResult;
use keystone_core::models::mfa::MfaState;
use keystone_core::models::user::{CreateUser, LockoutSchedule, UpdateUser, User};
use keystone_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::bounded;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    email: String,
    password_hash: String,
    password_history: Vec<String>,
    password_changed_at: DateTime<Utc>,
    failed_login_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    mfa: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    username: String,
    email: String,
    password_hash: String,
    password_history: Vec<String>,
    password_changed_at: DateTime<Utc>,
    failed_login_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    mfa: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_mfa(value: serde_json::Value) -> Result<MfaState, DbError> {
    serde_json::from_value(value).map_err(|e| DbError::Decode(format!("invalid mfa state: {e}")))
}

fn mfa_to_value(state: &MfaState) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(state).map_err(|e| DbError::Decode(format!("mfa state encode: {e}")))
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            password_history: self.password_history,
            password_changed_at: self.password_changed_at,
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
            mfa: parse_mfa(self.mfa)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid UUID: {e}")))?;
        Ok(User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            password_history: self.password_history,
            password_changed_at: self.password_changed_at,
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
            mfa: parse_mfa(self.mfa)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealUserRepository<C> {
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

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> CoreResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let result = db
                .query(
                    "CREATE type::record('user', $id) SET \
                     username = $username, email = $email, \
                     password_hash = $password_hash, \
                     password_history = [], \
                     failed_login_attempts = 0, \
                     locked_until = NONE, \
                     mfa = { state: 'disabled' }",
                )
                .bind(("id", id_str.clone()))
                .bind(("username", input.username))
                .bind(("email", input.email))
                .bind(("password_hash", input.password_hash))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::Migration(e.to_string()))?;

            let rows: Vec<UserRow> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })
        })
        .await?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> CoreResult<User> {
        let id_str = id.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let mut result = db
                .query("SELECT * FROM type::record('user', $id)")
                .bind(("id", id_str.clone()))
                .await?;

            let rows: Vec<UserRow> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })
        })
        .await?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_username(&self, username: &str) -> CoreResult<User> {
        let username = username.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let mut result = db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM user \
                     WHERE username = $username",
                )
                .bind(("username", username.clone()))
                .await?;

            let rows: Vec<UserRowWithId> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "user".into(),
                id: format!("username={username}"),
            })
        })
        .await?;

        Ok(row.try_into_user()?)
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<User> {
        let email = email.to_string();
        let db = self.db.clone();

        let row = bounded(self.timeout, async move {
            let mut result = db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM user \
                     WHERE email = $email",
                )
                .bind(("email", email.clone()))
                .await?;

            let rows: Vec<UserRowWithId> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "user".into(),
                id: format!("email={email}"),
            })
        })
        .await?;

        Ok(row.try_into_user()?)
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> CoreResult<User> {
        let id_str = id.to_string();
        let db = self.db.clone();

        let mfa_value = match &input.mfa {
            Some(state) => Some(mfa_to_value(state)?),
            None => None,
        };

        let row = bounded(self.timeout, async move {
            let mut sets = Vec::new();
            if input.password_hash.is_some() {
                sets.push("password_hash = $password_hash");
            }
            if input.password_history.is_some() {
                sets.push("password_history = $password_history");
            }
            if input.password_changed_at.is_some() {
                sets.push("password_changed_at = $password_changed_at");
            }
            if input.failed_login_attempts.is_some() {
                sets.push("failed_login_attempts = $failed_login_attempts");
            }
            if input.locked_until.is_some() {
                sets.push("locked_until = $locked_until");
            }
            if mfa_value.is_some() {
                sets.push("mfa = $mfa");
            }
            sets.push("updated_at = time::now()");

            let query = format!(
                "UPDATE type::record('user', $id) SET {}",
                sets.join(", ")
            );

            let mut builder = db.query(&query).bind(("id", id_str.clone()));

            if let Some(password_hash) = input.password_hash {
                builder = builder.bind(("password_hash", password_hash));
            }
            if let Some(password_history) = input.password_history {
                builder = builder.bind(("password_history", password_history));
            }
            if let Some(password_changed_at) = input.password_changed_at {
                builder = builder.bind(("password_changed_at", password_changed_at));
            }
            if let Some(failed_login_attempts) = input.failed_login_attempts {
                builder = builder.bind(("failed_login_attempts", failed_login_attempts));
            }
            if let Some(locked_until) = input.locked_until {
                // Option<Option<..>>: Some(Some(t)) = set, Some(None) = clear.
                builder = builder.bind(("locked_until", locked_until));
            }
            if let Some(mfa) = mfa_value {
                builder = builder.bind(("mfa", mfa));
            }

            let result = builder.await?;
            let mut result = result
                .check()
                .map_err(|e| DbError::Migration(e.to_string()))?;

            let rows: Vec<UserRow> = result.take(0)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })
        })
        .await?;

        Ok(row.into_user(id)?)
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        schedule: &LockoutSchedule,
    ) -> CoreResult<User> {
        let id_str = id.to_string();
        let db = self.db.clone();
        let schedule = schedule.clone();

        let row = bounded(self.timeout, async move {
            // One transaction: the counter bump and the lock write
            // commit together or not at all. The increment is a single
            // `+=` so concurrent failures never lose an update.
            let mut result = db
                .query(
                    "BEGIN TRANSACTION; \
                     UPDATE type::record('user', $id) SET \
                     failed_login_attempts += 1, updated_at = time::now(); \
                     UPDATE type::record('user', $id) SET \
                     locked_until = \
                         IF failed_login_attempts >= $hard { \
                             time::now() + duration::from_secs($hard_secs) \
                         } ELSE IF failed_login_attempts >= $free { \
                             time::now() + duration::from_secs( \
                                 array::at($steps, failed_login_attempts - $free)) \
                         } ELSE { \
                             locked_until \
                         }; \
                     COMMIT TRANSACTION;",
                )
                .bind(("id", id_str.clone()))
                .bind(("free", schedule.free_attempts))
                .bind(("hard", schedule.hard_attempts))
                .bind(("steps", schedule.step_lock_secs))
                .bind(("hard_secs", schedule.hard_lock_secs))
                .await?;

            // BEGIN and COMMIT each occupy a result slot, so the
            // second UPDATE lands at index 2.
            let rows: Vec<UserRow> = result.take(2)?;
            rows.into_iter().next().ok_or(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })
        })
        .await?;

        Ok(row.into_user(id)?)
    }

    async fn clear_login_failures(&self, id: Uuid) -> CoreResult<()> {
        let id_str = id.to_string();
        let db = self.db.clone();

        bounded(self.timeout, async move {
            db.query(
                "UPDATE type::record('user', $id) SET \
                 failed_login_attempts = 0, locked_until = NONE, \
                 updated_at = time::now()",
            )
            .bind(("id", id_str))
            .await?;
            Ok(())
        })
        .await?;

        Ok(())
    }
}

//! Integration tests for the SurrealDB stores using the in-memory engine.

use chrono::{Duration, Utc};
use keystone_core::models::mfa::{BackupCode, MfaMethod, MfaState};
use keystone_core::models::refresh_token::{CreateRefreshToken, RevocationReason};
use keystone_core::models::user::{CreateUser, LockoutSchedule, UpdateUser};
use keystone_core::repository::{RefreshTokenRepository, UserRepository};
use keystone_db::repository::{SurrealRefreshTokenRepository, SurrealUserRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    keystone_db::run_migrations(&db).await.unwrap();
    db
}

fn new_user(username: &str, email: &str) -> CreateUser {
    CreateUser {
        username: username.into(),
        email: email.into(),
        password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
    }
}

fn test_schedule() -> LockoutSchedule {
    LockoutSchedule {
        free_attempts: 5,
        hard_attempts: 10,
        step_lock_secs: vec![60, 120, 240, 480, 960],
        hard_lock_secs: 86_400,
    }
}

fn new_token(user_id: Uuid, hash: &str, ip: &str) -> CreateRefreshToken {
    CreateRefreshToken {
        user_id,
        token_hash: hash.into(),
        issued_to_ip: ip.into(),
        expires_at: Utc::now() + Duration::days(7),
    }
}

#[tokio::test]
async fn create_and_get_user() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.locked_until.is_none());
    assert!(user.password_history.is_empty());
    assert_eq!(user.mfa, MfaState::Disabled);

    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.id, user.id);
    assert_eq!(fetched.username, "alice");
}

#[tokio::test]
async fn get_user_by_username_and_email() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(new_user("bob", "bob@example.com"))
        .await
        .unwrap();

    let by_name = repo.get_by_username("bob").await.unwrap();
    assert_eq!(by_name.id, user.id);

    let by_email = repo.get_by_email("bob@example.com").await.unwrap();
    assert_eq!(by_email.id, user.id);

    assert!(repo.get_by_username("nobody").await.is_err());
}

#[tokio::test]
async fn duplicate_username_rejected() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    repo.create(new_user("unique-user", "first@example.com"))
        .await
        .unwrap();

    let result = repo
        .create(new_user("unique-user", "second@example.com"))
        .await;
    assert!(result.is_err(), "duplicate username should be rejected");
}

#[tokio::test]
async fn duplicate_email_rejected() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    repo.create(new_user("user-a", "same@example.com"))
        .await
        .unwrap();

    let result = repo.create(new_user("user-b", "same@example.com")).await;
    assert!(result.is_err(), "duplicate email should be rejected");
}

#[tokio::test]
async fn partial_update_leaves_other_fields() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(new_user("carol", "carol@example.com"))
        .await
        .unwrap();

    let updated = repo
        .update(
            user.id,
            UpdateUser {
                password_hash: Some("$argon2id$new".into()),
                password_history: Some(vec![user.password_hash.clone()]),
                password_changed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.password_hash, "$argon2id$new");
    assert_eq!(updated.password_history, vec![user.password_hash]);
    assert_eq!(updated.username, "carol"); // unchanged
    assert_eq!(updated.email, "carol@example.com"); // unchanged
}

#[tokio::test]
async fn lockout_fields_can_be_cleared() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);
    let schedule = test_schedule();

    let user = repo
        .create(new_user("dave", "dave@example.com"))
        .await
        .unwrap();

    for _ in 0..5 {
        repo.record_login_failure(user.id, &schedule).await.unwrap();
    }

    let locked = repo.get_by_id(user.id).await.unwrap();
    assert!(locked.locked_until.is_some());

    // Some(None) clears the field through a partial update.
    let cleared = repo
        .update(
            user.id,
            UpdateUser {
                locked_until: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.locked_until.is_none());
}

#[tokio::test]
async fn login_failures_increment_and_reset() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);
    let schedule = test_schedule();

    let user = repo
        .create(new_user("eve", "eve@example.com"))
        .await
        .unwrap();

    for expected in 1..=4u32 {
        let after = repo.record_login_failure(user.id, &schedule).await.unwrap();
        assert_eq!(after.failed_login_attempts, expected);
        assert!(after.locked_until.is_none(), "no lock below the threshold");
    }

    // The fifth failure returns the counter and the lock from the same
    // store transaction.
    let fifth = repo.record_login_failure(user.id, &schedule).await.unwrap();
    assert_eq!(fifth.failed_login_attempts, 5);
    let until = fifth.locked_until.expect("fifth failure locks");
    let remaining = (until - Utc::now()).num_seconds();
    assert!((50..=61).contains(&remaining), "one-minute lock, got {remaining}s");

    repo.clear_login_failures(user.id).await.unwrap();

    let fresh = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fresh.failed_login_attempts, 0);
    assert!(fresh.locked_until.is_none());
}

#[tokio::test]
async fn lock_window_escalates_with_the_count() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);
    let schedule = test_schedule();

    let user = repo
        .create(new_user("trent", "trent@example.com"))
        .await
        .unwrap();

    for _ in 0..6 {
        repo.record_login_failure(user.id, &schedule).await.unwrap();
    }
    let sixth = repo.get_by_id(user.id).await.unwrap();
    let remaining = (sixth.locked_until.unwrap() - Utc::now()).num_seconds();
    assert!((110..=121).contains(&remaining), "two-minute lock, got {remaining}s");

    for _ in 0..4 {
        repo.record_login_failure(user.id, &schedule).await.unwrap();
    }
    let tenth = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(tenth.failed_login_attempts, 10);
    let remaining = (tenth.locked_until.unwrap() - Utc::now()).num_seconds();
    assert!(remaining > 86_000, "24-hour hard lock, got {remaining}s");
}

#[tokio::test]
async fn mfa_state_round_trips_through_store() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(new_user("frank", "frank@example.com"))
        .await
        .unwrap();

    let state = MfaState::Enabled {
        method: MfaMethod::Totp,
        secret: "c2VhbGVkLXNlY3JldA".into(),
        destination: None,
        backup_codes: vec![
            BackupCode {
                code: "a1b2c3d4".into(),
                used: false,
            },
            BackupCode {
                code: "e5f6a7b8".into(),
                used: true,
            },
        ],
        code_issued_at: None,
    };

    repo.update(
        user.id,
        UpdateUser {
            mfa: Some(state.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.mfa, state);
}

#[tokio::test]
async fn create_and_get_refresh_token() {
    let db = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let tokens = SurrealRefreshTokenRepository::new(db);

    let user = users
        .create(new_user("grace", "grace@example.com"))
        .await
        .unwrap();

    let token = tokens
        .create(new_token(user.id, "hash-1", "10.0.0.1"))
        .await
        .unwrap();

    assert_eq!(token.user_id, user.id);
    assert_eq!(token.issued_to_ip, "10.0.0.1");
    assert!(!token.is_revoked);
    assert!(token.revoked_reason.is_none());

    let fetched = tokens.get_by_hash("hash-1").await.unwrap();
    assert_eq!(fetched.id, token.id);

    assert!(tokens.get_by_hash("no-such-hash").await.is_err());
}

#[tokio::test]
async fn consume_is_single_use() {
    let db = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let tokens = SurrealRefreshTokenRepository::new(db);

    let user = users
        .create(new_user("heidi", "heidi@example.com"))
        .await
        .unwrap();
    tokens
        .create(new_token(user.id, "hash-2", "10.0.0.1"))
        .await
        .unwrap();

    let first = tokens
        .consume("hash-2", RevocationReason::Rotation)
        .await
        .unwrap();
    assert!(first.is_some(), "first consume wins");

    let second = tokens
        .consume("hash-2", RevocationReason::Rotation)
        .await
        .unwrap();
    assert!(second.is_none(), "second consume must lose");

    // The record survives for reuse detection.
    let stored = tokens.get_by_hash("hash-2").await.unwrap();
    assert!(stored.is_revoked);
    assert_eq!(stored.revoked_reason, Some(RevocationReason::Rotation));
}

#[tokio::test]
async fn revoke_enforces_ownership() {
    let db = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let tokens = SurrealRefreshTokenRepository::new(db);

    let owner = users
        .create(new_user("ivan", "ivan@example.com"))
        .await
        .unwrap();
    let stranger = users
        .create(new_user("judy", "judy@example.com"))
        .await
        .unwrap();

    let token = tokens
        .create(new_token(owner.id, "hash-3", "10.0.0.1"))
        .await
        .unwrap();

    // Someone else's user_id never matches the predicate.
    let denied = tokens
        .revoke(stranger.id, token.id, RevocationReason::Manual)
        .await
        .unwrap();
    assert!(!denied);

    let granted = tokens
        .revoke(owner.id, token.id, RevocationReason::Manual)
        .await
        .unwrap();
    assert!(granted);

    // Already revoked, so a repeat flips nothing.
    let repeat = tokens
        .revoke(owner.id, token.id, RevocationReason::Manual)
        .await
        .unwrap();
    assert!(!repeat);
}

#[tokio::test]
async fn revoke_all_counts_only_unrevoked() {
    let db = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let tokens = SurrealRefreshTokenRepository::new(db);

    let user = users
        .create(new_user("mallory", "mallory@example.com"))
        .await
        .unwrap();

    for i in 0..3 {
        tokens
            .create(new_token(user.id, &format!("hash-all-{i}"), "10.0.0.1"))
            .await
            .unwrap();
    }
    tokens
        .consume("hash-all-0", RevocationReason::Logout)
        .await
        .unwrap();

    let revoked = tokens
        .revoke_all_for_user(user.id, RevocationReason::SecurityIpMismatch)
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    assert!(
        tokens.list_active_for_user(user.id).await.unwrap().is_empty()
    );
}

#[tokio::test]
async fn list_active_skips_revoked_and_expired() {
    let db = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let tokens = SurrealRefreshTokenRepository::new(db);

    let user = users
        .create(new_user("oscar", "oscar@example.com"))
        .await
        .unwrap();

    tokens
        .create(new_token(user.id, "hash-live", "10.0.0.1"))
        .await
        .unwrap();
    tokens
        .create(new_token(user.id, "hash-revoked", "10.0.0.2"))
        .await
        .unwrap();
    tokens
        .create(CreateRefreshToken {
            user_id: user.id,
            token_hash: "hash-expired".into(),
            issued_to_ip: "10.0.0.3".into(),
            expires_at: Utc::now() - Duration::hours(1),
        })
        .await
        .unwrap();

    tokens
        .consume("hash-revoked", RevocationReason::Logout)
        .await
        .unwrap();

    let active = tokens.list_active_for_user(user.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].token_hash, "hash-live");
}

#[tokio::test]
async fn cleanup_removes_expired_tokens() {
    let db = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let tokens = SurrealRefreshTokenRepository::new(db);

    let user = users
        .create(new_user("peggy", "peggy@example.com"))
        .await
        .unwrap();

    tokens
        .create(new_token(user.id, "hash-keep", "10.0.0.1"))
        .await
        .unwrap();
    for i in 0..2 {
        tokens
            .create(CreateRefreshToken {
                user_id: user.id,
                token_hash: format!("hash-old-{i}"),
                issued_to_ip: "10.0.0.1".into(),
                expires_at: Utc::now() - Duration::days(1),
            })
            .await
            .unwrap();
    }

    let removed = tokens.cleanup_expired().await.unwrap();
    assert_eq!(removed, 2);

    assert!(tokens.get_by_hash("hash-keep").await.is_ok());
    assert!(tokens.get_by_hash("hash-old-0").await.is_err());
}

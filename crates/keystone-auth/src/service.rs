//! Authentication service — registration, login, MFA, token rotation,
//! and password-change orchestration.

use chrono::Utc;
use keystone_core::CoreError;
use keystone_core::models::mfa::{MfaMethod, MfaState};
use keystone_core::models::refresh_token::{CreateRefreshToken, RevocationReason};
use keystone_core::models::user::{CreateUser, UpdateUser, User};
use keystone_core::repository::{RefreshTokenRepository, UserRepository};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::delivery::OtpSender;
use crate::error::{AuthError, AuthResult};
use crate::{lockout, mfa, password, token};

/// Input for registration.
#[derive(Debug)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub ip: String,
}

/// Input for the login flow.
#[derive(Debug)]
pub struct LoginInput {
    /// Username or email.
    pub identifier: String,
    pub password: String,
    pub ip: String,
}

/// A freshly minted access + refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Signed JWT access token.
    pub access_token: String,
    /// Raw opaque refresh token (returned to the client, stored only
    /// as a hash).
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Successful registration result.
#[derive(Debug)]
pub struct RegisterOutput {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

/// What a correct password gets you: tokens, or an MFA challenge.
#[derive(Debug)]
pub enum LoginOutcome {
    Tokens(TokenPair),
    /// Credentials verified; a second factor is required. For SMS and
    /// email a fresh code has already been delivered.
    MfaRequired { user_id: Uuid, method: MfaMethod },
}

/// Result of starting MFA enrollment.
#[derive(Debug)]
pub struct MfaEnrollment {
    /// otpauth URI for authenticator apps (TOTP only).
    pub provisioning_uri: Option<String>,
}

fn not_found_as(err: CoreError, fallback: AuthError) -> AuthError {
    match err {
        CoreError::NotFound { .. } => fallback,
        other => AuthError::Store(other),
    }
}

fn validate_registration(input: &RegisterInput, config: &AuthConfig) -> AuthResult<()> {
    let username = input.username.trim();
    if username.len() < 3
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AuthError::Validation(
            "username must be at least 3 characters (letters, digits, . _ -)".into(),
        ));
    }

    let email = input.email.trim();
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };
    if !valid_email {
        return Err(AuthError::Validation("invalid email address".into()));
    }

    if input.password.len() < config.min_password_length {
        return Err(AuthError::Validation(format!(
            "password must be at least {} characters",
            config.min_password_length
        )));
    }

    Ok(())
}

/// Authentication service.
///
/// Generic over the repository traits and the OTP delivery seam so the
/// auth layer has no dependency on the database crate or on any
/// SMS/email provider.
pub struct AuthService<U, R, S>
where
    U: UserRepository,
    R: RefreshTokenRepository,
    S: OtpSender,
{
    users: U,
    tokens: R,
    sender: S,
    config: AuthConfig,
}

impl<U, R, S> AuthService<U, R, S>
where
    U: UserRepository,
    R: RefreshTokenRepository,
    S: OtpSender,
{
    pub fn new(users: U, tokens: R, sender: S, config: AuthConfig) -> Self {
        Self {
            users,
            tokens,
            sender,
            config,
        }
    }

    /// Mint an access token and persist a new refresh token.
    async fn issue_pair(&self, user: &User, ip: &str) -> AuthResult<TokenPair> {
        let access_token = token::issue_access_token(user, ip, &self.config)?;

        let raw_refresh = token::generate_refresh_token();
        let expires_at =
            Utc::now() + chrono::Duration::seconds(self.config.refresh_token_lifetime_secs as i64);
        self.tokens
            .create(CreateRefreshToken {
                user_id: user.id,
                token_hash: token::hash_refresh_token(&raw_refresh),
                issued_to_ip: ip.to_string(),
                expires_at,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token: raw_refresh,
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    /// Look up a user by username, falling back to (lowercased) email.
    async fn find_by_identifier(&self, identifier: &str) -> AuthResult<User> {
        match self.users.get_by_username(identifier).await {
            Ok(user) => Ok(user),
            Err(CoreError::NotFound { .. }) => self
                .users
                .get_by_email(&identifier.to_lowercase())
                .await
                .map_err(|e| not_found_as(e, AuthError::InvalidCredentials)),
            Err(e) => Err(AuthError::Store(e)),
        }
    }

    /// Create an account and issue a first token pair.
    ///
    /// The plaintext password is hashed here and never persisted;
    /// email is stored lowercase so the uniqueness check is
    /// case-insensitive.
    pub async fn register(&self, input: RegisterInput) -> AuthResult<RegisterOutput> {
        validate_registration(&input, &self.config)?;

        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        match self.users.get_by_username(&username).await {
            Ok(_) => return Err(AuthError::DuplicateUser),
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(AuthError::Store(e)),
        }
        match self.users.get_by_email(&email).await {
            Ok(_) => return Err(AuthError::DuplicateUser),
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(AuthError::Store(e)),
        }

        let password_hash = password::hash_password(&input.password, &self.config)?;
        let user = self
            .users
            .create(CreateUser {
                username,
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        let tokens = self.issue_pair(&user, &input.ip).await?;
        Ok(RegisterOutput {
            user_id: user.id,
            tokens,
        })
    }

    /// Authenticate a credential pair.
    ///
    /// Lock state is checked before the hasher runs: a locked account
    /// fails fast regardless of password correctness. Each mismatch
    /// bumps the failure counter and may extend the lock; a match
    /// resets both.
    pub async fn login(&self, input: LoginInput) -> AuthResult<LoginOutcome> {
        let user = self.find_by_identifier(&input.identifier).await?;
        let now = Utc::now();

        if let Some(retry_after_secs) = user.lock_remaining_secs(now) {
            return Err(AuthError::Locked { retry_after_secs });
        }

        if !password::verify_password(&input.password, &user.password_hash, &self.config)? {
            // The counter bump and the lock write commit as one store
            // transaction; a cancelled request cannot split them.
            let after = self
                .users
                .record_login_failure(user.id, &lockout::schedule())
                .await?;
            if let Some(lock_secs) = after.lock_remaining_secs(now) {
                warn!(
                    user_id = %user.id,
                    failures = after.failed_login_attempts,
                    lock_secs,
                    "account locked after repeated login failures"
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        if user.failed_login_attempts > 0 || user.locked_until.is_some() {
            self.users.clear_login_failures(user.id).await?;
        }

        if let MfaState::Enabled { method, .. } = &user.mfa {
            let method = *method;
            let (next_state, delivery) = mfa::challenge(&self.config, &user.mfa, now)?;
            if let Some(state) = next_state {
                self.users
                    .update(
                        user.id,
                        UpdateUser {
                            mfa: Some(state),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            if let Some(d) = delivery {
                self.sender.deliver(method, &d.destination, &d.code).await?;
            }
            return Ok(LoginOutcome::MfaRequired {
                user_id: user.id,
                method,
            });
        }

        Ok(LoginOutcome::Tokens(self.issue_pair(&user, &input.ip).await?))
    }

    /// Complete an MFA-gated login with a method code or backup code.
    pub async fn verify_mfa(&self, user_id: Uuid, code: &str, ip: &str) -> AuthResult<TokenPair> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| not_found_as(e, AuthError::InvalidCredentials))?;

        let next_state =
            mfa::verify_login(&self.config, &user.mfa, code, &user.email, Utc::now())?;
        if next_state != user.mfa {
            self.users
                .update(
                    user.id,
                    UpdateUser {
                        mfa: Some(next_state),
                        ..Default::default()
                    },
                )
                .await?;
        }

        self.issue_pair(&user, ip).await
    }

    /// Rotate a refresh token: single use, with theft detection.
    ///
    /// Reuse of an already-rotated token and an IP mismatch are
    /// reported to the caller with the same generic message as any
    /// invalid token, but logged distinctly for auditing. An IP
    /// mismatch additionally revokes every token of the owner.
    pub async fn refresh(&self, raw_refresh_token: &str, ip: &str) -> AuthResult<TokenPair> {
        let token_hash = token::hash_refresh_token(raw_refresh_token);
        let record = self
            .tokens
            .get_by_hash(&token_hash)
            .await
            .map_err(|e| not_found_as(e, AuthError::TokenInvalid))?;

        if record.is_revoked {
            warn!(
                user_id = %record.user_id,
                token_id = %record.id,
                reason = ?record.revoked_reason,
                "revoked refresh token presented again"
            );
            return Err(AuthError::TokenReused);
        }
        let now = Utc::now();
        if record.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        if self.config.enforce_ip_binding && record.issued_to_ip != ip {
            let revoked = self
                .tokens
                .revoke_all_for_user(record.user_id, RevocationReason::SecurityIpMismatch)
                .await?;
            warn!(
                user_id = %record.user_id,
                issued_to_ip = %record.issued_to_ip,
                request_ip = %ip,
                revoked,
                "refresh token used from unexpected IP; all sessions revoked"
            );
            return Err(AuthError::TokenIpMismatch);
        }

        // CAS: exactly one concurrent caller gets the rotation.
        let consumed = self
            .tokens
            .consume(&token_hash, RevocationReason::Rotation)
            .await?;
        let Some(consumed) = consumed else {
            warn!(user_id = %record.user_id, token_id = %record.id, "lost rotation race");
            return Err(AuthError::TokenReused);
        };

        let user = self
            .users
            .get_by_id(consumed.user_id)
            .await
            .map_err(|e| not_found_as(e, AuthError::TokenInvalid))?;

        self.issue_pair(&user, ip).await
    }

    /// Revoke the presented refresh token. Idempotent: an unknown or
    /// already-revoked token is still a successful logout.
    pub async fn logout(&self, raw_refresh_token: &str) -> AuthResult<()> {
        let token_hash = token::hash_refresh_token(raw_refresh_token);
        self.tokens
            .consume(&token_hash, RevocationReason::Logout)
            .await?;
        Ok(())
    }

    /// Change a password, enforcing the no-reuse window, and revoke
    /// every standing session.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| not_found_as(e, AuthError::Unauthorized))?;

        if new_password.len() < self.config.min_password_length {
            return Err(AuthError::Validation(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        if !password::verify_password(current_password, &user.password_hash, &self.config)? {
            return Err(AuthError::CurrentPasswordMismatch);
        }
        if password::verify_password(new_password, &user.password_hash, &self.config)? {
            return Err(AuthError::SameAsCurrent);
        }
        for old_hash in &user.password_history {
            if password::verify_password(new_password, old_hash, &self.config)? {
                return Err(AuthError::PasswordReused);
            }
        }

        let new_hash = password::hash_password(new_password, &self.config)?;
        let mut history = user.password_history.clone();
        history.push(user.password_hash.clone());
        while history.len() > self.config.password_history_depth {
            history.remove(0); // oldest first
        }

        self.users
            .update(
                user.id,
                UpdateUser {
                    password_hash: Some(new_hash),
                    password_history: Some(history),
                    password_changed_at: Some(Utc::now()),
                    failed_login_attempts: Some(0),
                    locked_until: Some(None),
                    mfa: None,
                },
            )
            .await?;

        let revoked = self
            .tokens
            .revoke_all_for_user(user.id, RevocationReason::PasswordChange)
            .await?;
        info!(user_id = %user.id, revoked, "password changed; sessions revoked");
        Ok(())
    }

    /// Start enrolling a second factor. For SMS/email the verification
    /// code is delivered before this returns.
    pub async fn begin_mfa_enrollment(
        &self,
        user_id: Uuid,
        method: MfaMethod,
        destination: Option<String>,
    ) -> AuthResult<MfaEnrollment> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| not_found_as(e, AuthError::Unauthorized))?;

        if user.mfa.is_enabled() {
            return Err(AuthError::Validation(
                "MFA is already enabled; disable it first".into(),
            ));
        }

        let start =
            mfa::begin_enrollment(&self.config, method, &user.email, destination, Utc::now())?;
        self.users
            .update(
                user.id,
                UpdateUser {
                    mfa: Some(start.state),
                    ..Default::default()
                },
            )
            .await?;
        if let Some(d) = start.delivery {
            self.sender.deliver(method, &d.destination, &d.code).await?;
        }

        Ok(MfaEnrollment {
            provisioning_uri: start.provisioning_uri,
        })
    }

    /// Confirm a pending enrollment. Returns the backup codes — the
    /// only time they are ever visible.
    pub async fn confirm_mfa_enrollment(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> AuthResult<Vec<String>> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| not_found_as(e, AuthError::Unauthorized))?;

        let (enabled, backup_codes) =
            mfa::complete_enrollment(&self.config, &user.mfa, code, &user.email, Utc::now())?;
        self.users
            .update(
                user.id,
                UpdateUser {
                    mfa: Some(enabled),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %user.id, "MFA enabled");
        Ok(backup_codes)
    }

    /// Clear MFA entirely: method, secret, and all backup codes.
    pub async fn disable_mfa(&self, user_id: Uuid) -> AuthResult<()> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| not_found_as(e, AuthError::Unauthorized))?;

        if !user.mfa.is_enabled() {
            return Err(AuthError::MfaNotEnrolled);
        }

        self.users
            .update(
                user.id,
                UpdateUser {
                    mfa: Some(MfaState::Disabled),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user.id, "MFA disabled");
        Ok(())
    }
}

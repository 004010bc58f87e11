//! Authentication configuration.

/// Configuration for the authentication service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// How many previous password hashes are kept for reuse checks.
    pub password_history_depth: usize,
    /// Argon2id memory cost in KiB (default: 16_384 = 16 MiB).
    pub argon2_memory_kib: u32,
    /// Argon2id time cost (default: 3 iterations).
    pub argon2_iterations: u32,
    /// Argon2id lanes (default: 2).
    pub argon2_parallelism: u32,
    /// 256-bit AES-GCM key for sealing TOTP secrets at rest.
    /// `None` disables TOTP enrollment.
    pub mfa_encryption_key: Option<[u8; 32]>,
    /// Validity window for SMS/email one-time codes in seconds
    /// (default: 600 = 10 minutes).
    pub otp_lifetime_secs: u64,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Backup codes generated when MFA is enabled (default: 10).
    pub backup_code_count: usize,
    /// When true, rotating a refresh token from a different IP than it
    /// was issued to is treated as theft: every token of that user is
    /// revoked. Turn off in development environments.
    pub enforce_ip_binding: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            jwt_issuer: "keystone".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
            pepper: None,
            min_password_length: 8,
            password_history_depth: 5,
            argon2_memory_kib: 16_384,
            argon2_iterations: 3,
            argon2_parallelism: 2,
            mfa_encryption_key: None,
            otp_lifetime_secs: 600,
            totp_issuer: "Keystone".into(),
            backup_code_count: 10,
            enforce_ip_binding: true,
        }
    }
}

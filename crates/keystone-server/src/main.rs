//! Keystone server — application entry point.

use std::time::Duration;

use keystone_auth::delivery::NoopSender;
use keystone_auth::{AuthConfig, AuthService};
use keystone_db::repository::{SurrealRefreshTokenRepository, SurrealUserRepository};
use keystone_db::{DbConfig, DbManager, run_migrations};
use tracing_subscriber::EnvFilter;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn mfa_key_from_env() -> Result<Option<[u8; 32]>, Box<dyn std::error::Error>> {
    let Ok(encoded) = std::env::var("KEYSTONE_MFA_KEY_HEX") else {
        return Ok(None);
    };
    let bytes = hex::decode(&encoded)?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "KEYSTONE_MFA_KEY_HEX must be 32 bytes of hex")?;
    Ok(Some(key))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keystone=info".parse()?))
        .json()
        .init();

    tracing::info!("Starting Keystone server...");

    let db_config = DbConfig {
        url: env_or("KEYSTONE_DB_URL", "127.0.0.1:8000"),
        namespace: env_or("KEYSTONE_DB_NS", "keystone"),
        database: env_or("KEYSTONE_DB_NAME", "auth"),
        username: env_or("KEYSTONE_DB_USER", "root"),
        password: env_or("KEYSTONE_DB_PASS", "root"),
        query_timeout: Duration::from_secs(5),
    };

    let manager = DbManager::connect(&db_config).await?;
    run_migrations(manager.client()).await?;

    let auth_config = AuthConfig {
        jwt_private_key_pem: std::fs::read_to_string(env_or(
            "KEYSTONE_JWT_PRIVATE_KEY_FILE",
            "keys/jwt-ed25519.pem",
        ))?,
        jwt_public_key_pem: std::fs::read_to_string(env_or(
            "KEYSTONE_JWT_PUBLIC_KEY_FILE",
            "keys/jwt-ed25519.pub.pem",
        ))?,
        pepper: std::env::var("KEYSTONE_PEPPER").ok(),
        mfa_encryption_key: mfa_key_from_env()?,
        ..AuthConfig::default()
    };

    let users = SurrealUserRepository::with_timeout(
        manager.client().clone(),
        db_config.query_timeout,
    );
    let tokens = SurrealRefreshTokenRepository::with_timeout(
        manager.client().clone(),
        db_config.query_timeout,
    );
    let _service = AuthService::new(users, tokens, NoopSender, auth_config);

    // TODO: expose the service over HTTP once the transport layer lands

    tracing::info!("Keystone server stopped.");
    Ok(())
}

//! SurrealDB repository implementations.
//!
//! Every operation runs under the configured query timeout and fails
//! closed — a slow store rejects the request rather than hanging it.

mod refresh_token;
mod user;

use std::time::Duration;

use crate::error::DbError;

pub use refresh_token::SurrealRefreshTokenRepository;
pub use user::SurrealUserRepository;

/// Run a store operation under a request-scoped deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    op: impl Future<Output = Result<T, DbError>>,
) -> Result<T, DbError> {
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| DbError::Timeout)?
}

//! Out-of-band code delivery seam.
//!
//! The core only needs "deliver this code to this address" and a
//! success/failure result; SMS and email providers live behind this
//! trait in other services.

use keystone_core::models::mfa::MfaMethod;

use crate::error::AuthError;

pub trait OtpSender: Send + Sync {
    /// Deliver a one-time code. A failure aborts the operation that
    /// needed the code (enrollment or login challenge).
    fn deliver(
        &self,
        method: MfaMethod,
        destination: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// Sender that drops codes on the floor, logging only that a delivery
/// would have happened. For environments without SMS/email wiring.
#[derive(Debug, Clone, Default)]
pub struct NoopSender;

impl OtpSender for NoopSender {
    async fn deliver(
        &self,
        method: MfaMethod,
        destination: &str,
        _code: &str,
    ) -> Result<(), AuthError> {
        tracing::info!(method = method.as_str(), destination, "OTP delivery skipped (noop sender)");
        Ok(())
    }
}

//! Success-path hook.

use crate::verifier::VerificationStatus;

/// Notified after a payment has been verified and its context attached.
///
/// Receives only the verification status and the requirement identifier, never the
/// credential.
pub trait PaymentObserver: Send + Sync {
    fn on_verified(&self, status: VerificationStatus, requirement_id: &str);
}

/// Observer emitting a `tracing` event per verified payment.
#[cfg(feature = "telemetry")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

#[cfg(feature = "telemetry")]
impl PaymentObserver for TracingObserver {
    fn on_verified(&self, status: VerificationStatus, requirement_id: &str) {
        tracing::info!(
            status = status.as_str(),
            requirement = requirement_id,
            "x402 verification succeeded"
        );
    }
}
